//! Schema-driven SQL statement builder.
//!
//! [`SqlBuilder`] renders parameterized SELECT, INSERT, UPDATE and DELETE
//! statements for one [`Schema`] in one dialect. Chain methods accumulate
//! [`QueryParams`]; every terminal operation consumes and resets them, so a
//! reused builder never carries a filter or ordering into the next call.
//!
//! ```rust,ignore
//! let mut builder = SqlBuilder::new(schema, DialectImpl::from_db_type(DbType::Mssql));
//! let stmt = builder
//!     .select("objid,name")
//!     .find(criteria)
//!     .order_by("name, age DESC")
//!     .limit(Some(10), None)
//!     .list();
//! assert_eq!(stmt.sql, "SELECT TOP 10 [objid],[name] FROM entity WHERE [state]=@state ORDER BY name, age DESC");
//! ```

pub mod codec;
mod filter;

pub use filter::Filter;

use std::sync::Arc;

use serde_json::Value;

use crate::core::schema::Schema;
use crate::core::traits::{Dialect, SelectQueryOptions};
use crate::core::value::{BoundParam, Entity, Statement};
use crate::drivers::DialectImpl;
use crate::error::{MigrateError, Result};

/// Accumulated chain state between terminal operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub select: Option<String>,
    pub filter: Option<Filter>,
    pub order_by: Option<String>,
    pub start: Option<u64>,
    pub limit: Option<u64>,
}

/// Fluent statement builder bound to one schema and dialect.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    schema: Arc<Schema>,
    dialect: DialectImpl,
    params: QueryParams,
}

impl SqlBuilder {
    pub fn new(schema: Arc<Schema>, dialect: DialectImpl) -> Self {
        Self {
            schema,
            dialect,
            params: QueryParams::default(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    /// Chain state accumulated so far.
    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Comma separated column list. Entries containing `*` are not delimited.
    pub fn select(&mut self, fields: &str) -> &mut Self {
        self.params.select = Some(fields.to_string());
        self
    }

    /// Filter by field equality.
    pub fn find(&mut self, criteria: Entity) -> &mut Self {
        self.params.filter = Some(Filter::Fields(criteria));
        self
    }

    /// Filter by an explicit clause.
    pub fn filter(&mut self, filter: Filter) -> &mut Self {
        self.params.filter = Some(filter);
        self
    }

    /// Ordering spec, emitted verbatim after `ORDER BY`.
    pub fn order_by(&mut self, spec: &str) -> &mut Self {
        self.params.order_by = Some(spec.to_string());
        self
    }

    /// Row window. A lone positive `start` is taken as the limit.
    pub fn limit(&mut self, start: Option<u64>, limit: Option<u64>) -> &mut Self {
        match (start, limit) {
            (Some(n), None) if n > 0 => {
                self.params.start = None;
                self.params.limit = Some(n);
            }
            _ => {
                self.params.start = start;
                self.params.limit = limit;
            }
        }
        self
    }

    /// SELECT using the accumulated chain.
    pub fn list(&mut self) -> Statement {
        let params = self.take_params();
        let (where_clause, values) = self.render_where(params.filter);

        let opts = SelectQueryOptions {
            table: self.schema.table_name().to_string(),
            columns: self.render_columns(params.select.as_deref()),
            where_clause,
            order_by: params.order_by,
            start: params.start,
            limit: params.limit,
        };

        Statement::new(self.dialect.build_select_query(&opts), values)
    }

    /// SELECT of at most one row. Any window set on the chain is replaced.
    pub fn first(&mut self) -> Statement {
        self.params.start = None;
        self.params.limit = Some(1);
        self.list()
    }

    /// SELECT * by primary key, without a row limit.
    pub fn read(&mut self, entity: &Entity) -> Statement {
        let key = self.primary_key_filter(entity);
        self.params = QueryParams {
            filter: Some(Filter::Fields(key)),
            ..QueryParams::default()
        };
        self.list()
    }

    /// INSERT of every schema field in declaration order.
    pub fn create(&mut self, entity: &Entity) -> Result<Statement> {
        self.take_params();

        let mut columns = Vec::new();
        let mut markers = Vec::new();
        let mut values = Vec::new();
        for field in self.schema.fields() {
            let value = codec::serialize_value(field, entity.get(&field.name))?;
            columns.push(self.dialect.quote_ident(&field.name));
            markers.push(self.dialect.param_marker(&field.name));
            values.push(BoundParam::new(field.name.clone(), value, field.field_type));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES({})",
            self.schema.table_name(),
            columns.join(","),
            markers.join(",")
        );
        Ok(Statement::new(sql, values))
    }

    /// UPDATE of the entity's non-key schema fields, filtered by the chain.
    pub fn update(&mut self, entity: &Entity) -> Result<Statement> {
        let params = self.take_params();

        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (name, value) in entity {
            let Some(field) = self.schema.field(name) else {
                continue;
            };
            if field.primary {
                continue;
            }
            let value = codec::serialize_value(field, Some(value))?;
            assignments.push(format!(
                "{}={}",
                self.dialect.quote_ident(&field.name),
                self.dialect.param_marker(&field.name)
            ));
            values.push(BoundParam::new(field.name.clone(), value, field.field_type));
        }

        if assignments.is_empty() {
            return Err(MigrateError::Validation(format!(
                "no updatable {} fields given",
                self.schema.name()
            )));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.schema.table_name(),
            assignments.join(", ")
        );
        let (where_clause, where_values) = self.render_where(params.filter);
        if let Some(where_clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        values.extend(where_values);

        Ok(Statement::new(sql, values))
    }

    /// UPDATE by primary key.
    pub fn update_entity(&mut self, entity: &Entity) -> Result<Statement> {
        let key = self.primary_key_filter(entity);
        self.find(key).update(entity)
    }

    /// DELETE filtered by the chain (every row when unfiltered).
    pub fn delete(&mut self) -> Statement {
        let params = self.take_params();
        let mut sql = format!("DELETE FROM {}", self.schema.table_name());
        let (where_clause, values) = self.render_where(params.filter);
        if let Some(where_clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        Statement::new(sql, values)
    }

    /// DELETE by primary key.
    pub fn delete_entity(&mut self, entity: &Entity) -> Statement {
        let key = self.primary_key_filter(entity);
        self.find(key).delete()
    }

    fn take_params(&mut self) -> QueryParams {
        std::mem::take(&mut self.params)
    }

    fn primary_key_filter(&self, entity: &Entity) -> Entity {
        self.schema
            .primary_fields()
            .map(|f| {
                let value = entity.get(&f.name).cloned().unwrap_or(Value::Null);
                (f.name.clone(), value)
            })
            .collect()
    }

    fn render_columns(&self, select: Option<&str>) -> String {
        let Some(select) = select.filter(|s| !s.trim().is_empty()) else {
            return "*".to_string();
        };
        select
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| {
                if f.contains('*') {
                    f.to_string()
                } else {
                    self.dialect.quote_ident(f)
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn render_where(&self, filter: Option<Filter>) -> (Option<String>, Vec<BoundParam>) {
        match filter.and_then(|f| filter::render_filter(f, &self.schema, &self.dialect)) {
            Some((sql, values)) => (Some(sql), values),
            None => (None, Vec::new()),
        }
    }
}
