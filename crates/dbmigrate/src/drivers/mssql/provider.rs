//! SQL Server statement provider.
//!
//! Holds a single `tiberius` connection behind a bb8 pool of size one.
//! Parameterized statements use `@name` markers; they are rewritten to the
//! positional `@P1..@Pn` form tiberius expects and each value is bound with a
//! native type chosen from the parameter's declared field type.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use bb8::Pool;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use bb8::ManageConnection;
use tiberius::numeric::Numeric;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Query, Row};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::core::identifier::{is_ident_char, is_ident_start};
use crate::core::schema::FieldType;
use crate::core::traits::Provider;
use crate::core::value::{sql_datetime, BoundParam, Entity};
use crate::drivers::DbType;
use crate::error::{MigrateError, Result};

const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: DatabaseConfig,
}

impl TiberiusConnectionManager {
    fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.effective_port());
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.trust_server_cert {
            config.trust_cert();
        }
        if self.config.encrypt {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// SQL Server provider over a single pooled connection.
pub struct MssqlProvider {
    pool: Mutex<Option<Pool<TiberiusConnectionManager>>>,
    label: String,
}

impl MssqlProvider {
    /// Open the connection and verify it with `SELECT 1`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let label = format!(
            "{}:{}/{}",
            config.host,
            config.effective_port(),
            config.database
        );
        let manager = TiberiusConnectionManager::new(config.clone());

        // A single direct attempt surfaces the driver's own error instead of
        // the pool's retry timeout.
        {
            let mut conn = tokio::time::timeout(POOL_CONNECTION_TIMEOUT, manager.connect())
                .await
                .map_err(|_| {
                    MigrateError::connection(
                        "connection attempt timed out",
                        format!("connecting to SQL Server {}", label),
                    )
                })??;
            conn.simple_query("SELECT 1").await?.into_results().await?;
        }

        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .test_on_check_out(true)
            .build(manager)
            .await?;

        info!("Connected to SQL Server: {}", label);

        Ok(Self {
            pool: Mutex::new(Some(pool)),
            label,
        })
    }

    async fn pool(&self) -> Result<Pool<TiberiusConnectionManager>> {
        self.pool
            .lock()
            .await
            .clone()
            .ok_or_else(|| MigrateError::connection("provider is closed", self.label.clone()))
    }
}

#[async_trait]
impl Provider for MssqlProvider {
    fn db_type(&self) -> DbType {
        DbType::Mssql
    }

    async fn execute(&self, sql: &str, params: &[BoundParam]) -> Result<Vec<Entity>> {
        let pool = self.pool().await?;
        let mut conn = pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(e, format!("getting SQL Server connection {}", self.label)))?;

        debug!("SQL Server execute ({} params): {}", params.len(), sql);

        let rows = if params.is_empty() {
            conn.simple_query(sql).await?.into_first_result().await?
        } else {
            let (positional, markers) = to_positional(sql);
            if markers != params.len() {
                return Err(MigrateError::Validation(format!(
                    "statement has {} parameter markers but {} values were bound",
                    markers,
                    params.len()
                )));
            }
            let mut query = Query::new(positional);
            for param in params {
                bind_param(&mut query, param)?;
            }
            query.query(&mut *conn).await?.into_first_result().await?
        };

        rows.into_iter().map(row_to_entity).collect()
    }

    async fn close(&self) -> Result<()> {
        if self.pool.lock().await.take().is_some() {
            debug!("Closed SQL Server connection {}", self.label);
        }
        Ok(())
    }
}

/// Rewrite `@name` markers to `@P1..@Pn` in order of appearance.
///
/// Quoted literals, bracketed identifiers and `@@` system variables are
/// copied through untouched. Returns the rewritten text and the marker count.
pub(crate) fn to_positional(sql: &str) -> (String, usize) {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut count = 0;
    let mut closing: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(end) = closing {
            out.push(c);
            if c == end {
                closing = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                closing = Some(c);
                out.push(c);
            }
            '[' => {
                closing = Some(']');
                out.push(c);
            }
            '@' if chars.peek() == Some(&'@') => {
                out.push_str("@@");
                chars.next();
                while let Some(&next) = chars.peek() {
                    if !is_ident_char(next) {
                        break;
                    }
                    out.push(next);
                    chars.next();
                }
            }
            '@' if chars.peek().copied().is_some_and(is_ident_start) => {
                while chars.peek().copied().is_some_and(is_ident_char) {
                    chars.next();
                }
                count += 1;
                out.push_str(&format!("@P{}", count));
            }
            _ => out.push(c),
        }
    }

    (out, count)
}

/// A parameter value converted to the native type it is bound with.
#[derive(Debug, Clone, PartialEq)]
enum MssqlParam {
    Null,
    Int(i64),
    Decimal(Decimal),
    Float(f64),
    Bit(bool),
    DateTime(NaiveDateTime),
    Text(String),
}

fn to_mssql_param(param: &BoundParam) -> Result<MssqlParam> {
    let value = match (param.field_type, &param.value) {
        (_, Value::Null) => MssqlParam::Null,
        (FieldType::Integer, Value::Number(n)) => match n.as_i64() {
            Some(i) => MssqlParam::Int(i),
            None => MssqlParam::Int(n.as_f64().unwrap_or_default().trunc() as i64),
        },
        (FieldType::Decimal, Value::Number(n)) => match n.to_string().parse::<Decimal>() {
            Ok(d) => MssqlParam::Decimal(d),
            Err(_) => MssqlParam::Float(n.as_f64().unwrap_or_default()),
        },
        (FieldType::Boolean, Value::Bool(b)) => MssqlParam::Bit(*b),
        (FieldType::Boolean, Value::Number(n)) => {
            MssqlParam::Bit(n.as_f64().is_some_and(|f| f != 0.0))
        }
        (FieldType::Date, Value::String(s)) => {
            let dt = sql_datetime::parse(s).map_err(|e| {
                MigrateError::Validation(format!("{}: invalid date '{}': {}", param.field, s, e))
            })?;
            MssqlParam::DateTime(dt)
        }
        (_, Value::String(s)) => MssqlParam::Text(s.clone()),
        (_, other) => MssqlParam::Text(other.to_string()),
    };
    Ok(value)
}

fn bind_param(query: &mut Query<'_>, param: &BoundParam) -> Result<()> {
    match to_mssql_param(param)? {
        MssqlParam::Null => query.bind(Option::<String>::None),
        MssqlParam::Int(i) => query.bind(i),
        MssqlParam::Decimal(d) => {
            query.bind(Numeric::new_with_scale(d.mantissa(), d.scale() as u8))
        }
        MssqlParam::Float(f) => query.bind(f),
        MssqlParam::Bit(b) => query.bind(b),
        MssqlParam::DateTime(dt) => query.bind(dt),
        MssqlParam::Text(s) => query.bind(s),
    }
    Ok(())
}

fn row_to_entity(row: Row) -> Result<Entity> {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut entity = Entity::new();
    for (name, data) in names.into_iter().zip(row) {
        entity.insert(name, to_json(&data)?);
    }
    Ok(entity)
}

fn number(value: Option<f64>) -> Value {
    value
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn to_json(data: &ColumnData<'static>) -> Result<Value> {
    let value = match data {
        ColumnData::U8(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::F32(v) => number(v.map(f64::from)),
        ColumnData::F64(v) => number(*v),
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())).unwrap_or(Value::Null),
        ColumnData::Numeric(v) => number(v.and_then(|n| n.to_string().parse::<f64>().ok())),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b: &Cow<'static, [u8]>| {
                Value::String(b.iter().map(|byte| format!("{:02x}", byte)).collect())
            })
            .unwrap_or(Value::Null),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)?
                .map(|dt| Value::String(dt.format(sql_datetime::FORMAT).to_string()))
                .unwrap_or(Value::Null)
        }
        ColumnData::DateTimeOffset(_) => DateTime::<Utc>::from_sql(data)?
            .map(|dt| Value::String(dt.format(sql_datetime::FORMAT).to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Date(_) => NaiveDate::from_sql(data)?
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Time(_) => NaiveTime::from_sql(data)?
            .map(|t| Value::String(t.format("%H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| Value::String(x.clone().into_owned().into_string()))
            .unwrap_or(Value::Null),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_positional_renumbers_markers() {
        let (sql, n) = to_positional("SELECT * FROM entity WHERE [state] = @state OR [name] LIKE @name");
        assert_eq!(sql, "SELECT * FROM entity WHERE [state] = @P1 OR [name] LIKE @P2");
        assert_eq!(n, 2);
    }

    #[test]
    fn test_to_positional_repeated_name_binds_twice() {
        let (sql, n) = to_positional("UPDATE entity SET [state]=@state WHERE [state]=@state");
        assert_eq!(sql, "UPDATE entity SET [state]=@P1 WHERE [state]=@P2");
        assert_eq!(n, 2);
    }

    #[test]
    fn test_to_positional_skips_literals_and_system_variables() {
        let (sql, n) = to_positional(
            "SELECT @@VERSION, 'user@example.com', [odd@col] FROM t WHERE a=@a",
        );
        assert_eq!(
            sql,
            "SELECT @@VERSION, 'user@example.com', [odd@col] FROM t WHERE a=@P1"
        );
        assert_eq!(n, 1);
    }

    fn param(field_type: FieldType, value: Value) -> MssqlParam {
        to_mssql_param(&BoundParam::new("f", value, field_type)).unwrap()
    }

    #[test]
    fn test_params_bind_by_field_type() {
        use serde_json::json;

        assert_eq!(param(FieldType::String, json!(null)), MssqlParam::Null);
        assert_eq!(param(FieldType::Integer, json!(42)), MssqlParam::Int(42));
        assert_eq!(param(FieldType::Integer, json!(4.9)), MssqlParam::Int(4));
        assert_eq!(
            param(FieldType::Decimal, json!(12.5)),
            MssqlParam::Decimal("12.5".parse().unwrap())
        );
        assert_eq!(param(FieldType::Boolean, json!(1)), MssqlParam::Bit(true));
        assert_eq!(param(FieldType::Boolean, json!(false)), MssqlParam::Bit(false));
        assert_eq!(param(FieldType::String, json!("abc")), MssqlParam::Text("abc".into()));
    }

    #[test]
    fn test_date_params_bind_as_datetime() {
        use serde_json::json;

        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 15, 0)
            .unwrap();
        assert_eq!(
            param(FieldType::Date, json!("2024-03-01 08:15:00")),
            MssqlParam::DateTime(expected)
        );

        let bad = BoundParam::new("birthdate", json!("01/03/2024"), FieldType::Date);
        assert!(matches!(
            to_mssql_param(&bad),
            Err(MigrateError::Validation(m)) if m.contains("birthdate")
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_reports_driver_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = DatabaseConfig::new(DbType::Mssql, "127.0.0.1", "dbm", "sa", "");
        config.port = Some(port);

        let started = std::time::Instant::now();
        let err = MssqlProvider::connect(&config).await.err().unwrap();
        assert!(matches!(err, MigrateError::Mssql(_)), "unexpected error: {}", err);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_to_json_scalars() {
        assert_eq!(to_json(&ColumnData::I32(Some(5))).unwrap(), Value::from(5));
        assert_eq!(to_json(&ColumnData::I32(None)).unwrap(), Value::Null);
        assert_eq!(to_json(&ColumnData::Bit(Some(true))).unwrap(), Value::Bool(true));
        assert_eq!(
            to_json(&ColumnData::String(Some(Cow::from("abc")))).unwrap(),
            Value::from("abc")
        );
        assert_eq!(
            to_json(&ColumnData::Binary(Some(Cow::from(vec![0x0a_u8, 0xff])))).unwrap(),
            Value::from("0aff")
        );
    }
}
