//! MySQL/MariaDB statement provider.
//!
//! Uses a `mysql_async` pool. Every statement is bounded by the configured
//! timeout. Statements without parameters go over the text protocol so that
//! migration scripts may contain anything the server accepts; parameterized
//! statements are prepared and bound positionally.

use std::time::Duration;

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, Row, Value as MySqlValue};
use serde_json::{Number, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::core::traits::Provider;
use crate::core::value::{BoundParam, Entity};
use crate::drivers::DbType;
use crate::error::{MigrateError, Result};

/// MySQL provider backed by a connection pool.
pub struct MysqlProvider {
    pool: Mutex<Option<Pool>>,
    timeout: Duration,
    label: String,
}

impl MysqlProvider {
    /// Create the pool and verify it with `SELECT 1`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let constraints = PoolConstraints::new(0, config.connection_limit as usize)
            .ok_or_else(|| MigrateError::Config("invalid MySQL connection_limit".into()))?;

        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.effective_port())
            .db_name(Some(config.database.clone()))
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .pool_opts(PoolOpts::default().with_constraints(constraints));

        let pool = Pool::new(opts);
        let label = format!(
            "{}:{}/{}",
            config.host,
            config.effective_port(),
            config.database
        );

        // Test connection
        let timeout = Duration::from_secs(config.timeout_secs);
        let check = async {
            let mut conn = pool.get_conn().await?;
            conn.query_drop("SELECT 1").await?;
            Ok::<_, mysql_async::Error>(())
        };
        let outcome = tokio::time::timeout(timeout, check).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                discard_pool(pool, &label).await;
                return Err(MigrateError::connection(e, format!("connecting to MySQL {}", label)));
            }
            Err(_) => {
                discard_pool(pool, &label).await;
                return Err(MigrateError::connection(
                    "connection attempt timed out",
                    format!("connecting to MySQL {}", label),
                ));
            }
        }

        info!("Connected to MySQL: {}", label);

        Ok(Self {
            pool: Mutex::new(Some(pool)),
            timeout,
            label,
        })
    }

    async fn pool(&self) -> Result<Pool> {
        self.pool
            .lock()
            .await
            .clone()
            .ok_or_else(|| MigrateError::connection("provider is closed", self.label.clone()))
    }
}

#[async_trait]
impl Provider for MysqlProvider {
    fn db_type(&self) -> DbType {
        DbType::Mysql
    }

    async fn execute(&self, sql: &str, params: &[BoundParam]) -> Result<Vec<Entity>> {
        let pool = self.pool().await?;
        debug!("MySQL execute ({} params): {}", params.len(), sql);

        let run = async {
            let mut conn = pool.get_conn().await?;
            let rows: Vec<Row> = if params.is_empty() {
                conn.query(sql).await?
            } else {
                let values = params.iter().map(to_mysql_value).collect();
                conn.exec(sql, Params::Positional(values)).await?
            };
            Ok::<_, mysql_async::Error>(rows)
        };

        let rows = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| MigrateError::Timeout(self.timeout.as_secs()))??;

        Ok(rows.into_iter().map(row_to_entity).collect())
    }

    async fn close(&self) -> Result<()> {
        if let Some(pool) = self.pool.lock().await.take() {
            pool.disconnect().await?;
            debug!("Closed MySQL pool {}", self.label);
        }
        Ok(())
    }
}

fn to_mysql_value(param: &BoundParam) -> MySqlValue {
    match &param.value {
        Value::Null => MySqlValue::NULL,
        Value::Bool(b) => MySqlValue::Int(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                MySqlValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                MySqlValue::UInt(u)
            } else {
                MySqlValue::Double(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => MySqlValue::Bytes(s.clone().into_bytes()),
        other => MySqlValue::Bytes(other.to_string().into_bytes()),
    }
}

async fn discard_pool(pool: Pool, label: &str) {
    if let Err(e) = pool.disconnect().await {
        warn!("Failed to disconnect MySQL pool {}: {}", label, e);
    }
}

fn row_to_entity(row: Row) -> Entity {
    let columns = row.columns();
    let values = row.unwrap();

    columns
        .iter()
        .zip(values)
        .map(|(column, value)| (column.name_str().into_owned(), to_json(value)))
        .collect()
}

fn to_json(value: MySqlValue) -> Value {
    match value {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        MySqlValue::Int(i) => Value::from(i),
        MySqlValue::UInt(u) => Value::from(u),
        MySqlValue::Float(f) => Number::from_f64(f64::from(f))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        MySqlValue::Double(d) => Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null),
        MySqlValue::Date(year, month, day, hour, minute, second, _micros) => Value::String(format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            year, month, day, hour, minute, second
        )),
        MySqlValue::Time(negative, days, hours, minutes, seconds, _micros) => {
            let total_hours = days * 24 + u32::from(hours);
            Value::String(format!(
                "{}{:02}:{:02}:{:02}",
                if negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::FieldType;
    use serde_json::json;

    #[tokio::test]
    async fn test_connect_refused_reports_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = DatabaseConfig::new(DbType::Mysql, "127.0.0.1", "dbm", "root", "");
        config.port = Some(port);
        config.timeout_secs = 5;

        let err = MysqlProvider::connect(&config).await.err().unwrap();
        match err {
            MigrateError::Connection { context, .. } => {
                assert!(context.contains(&format!("127.0.0.1:{}/dbm", port)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_to_mysql_value() {
        let p = |v| BoundParam::new("f", v, FieldType::String);
        assert_eq!(to_mysql_value(&p(json!(null))), MySqlValue::NULL);
        assert_eq!(to_mysql_value(&p(json!(true))), MySqlValue::Int(1));
        assert_eq!(to_mysql_value(&p(json!(42))), MySqlValue::Int(42));
        assert_eq!(to_mysql_value(&p(json!(1.5))), MySqlValue::Double(1.5));
        assert_eq!(
            to_mysql_value(&p(json!("abc"))),
            MySqlValue::Bytes(b"abc".to_vec())
        );
        assert_eq!(
            to_mysql_value(&p(json!({"a": 1}))),
            MySqlValue::Bytes(br#"{"a":1}"#.to_vec())
        );
    }

    #[test]
    fn test_to_json_temporal_values() {
        assert_eq!(
            to_json(MySqlValue::Date(2024, 3, 1, 8, 5, 9, 0)),
            json!("2024-03-01 08:05:09")
        );
        assert_eq!(
            to_json(MySqlValue::Time(true, 1, 2, 3, 4, 0)),
            json!("-26:03:04")
        );
        assert_eq!(to_json(MySqlValue::Bytes(b"x".to_vec())), json!("x"));
        assert_eq!(to_json(MySqlValue::UInt(7)), json!(7));
    }
}
