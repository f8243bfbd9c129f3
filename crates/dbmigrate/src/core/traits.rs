//! Core traits: SQL dialects, statement providers and provider factories.

use std::sync::Arc;

use async_trait::async_trait;

use super::value::{BoundParam, Entity};
use crate::config::DatabaseConfig;
use crate::drivers::{DbType, DialectImpl};
use crate::error::Result;

/// SQL syntax strategy for a database engine.
///
/// The builder renders everything that is common to both engines and asks
/// the dialect only for the parts that differ: identifier delimiters,
/// parameter markers and how row limits are expressed.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mysql", "mssql").
    fn name(&self) -> &str;

    /// Quote an identifier (column name).
    ///
    /// - MySQL: `` `identifier` ``
    /// - MSSQL: `[identifier]`
    fn quote_ident(&self, name: &str) -> String;

    /// Marker that stands in for the named parameter `name`.
    ///
    /// - MySQL: `?`
    /// - MSSQL: `@name`
    fn param_marker(&self, name: &str) -> String;

    /// Assemble a SELECT statement from already rendered parts.
    fn build_select_query(&self, opts: &SelectQueryOptions) -> String;
}

/// Rendered pieces of a SELECT statement.
#[derive(Debug, Clone, Default)]
pub struct SelectQueryOptions {
    /// Table name, emitted as is.
    pub table: String,
    /// Rendered column list (`*` or delimited names).
    pub columns: String,
    /// Rendered filter without the `WHERE` keyword.
    pub where_clause: Option<String>,
    /// Ordering spec without the `ORDER BY` keyword.
    pub order_by: Option<String>,
    /// Rows to skip. Not every dialect honors this.
    pub start: Option<u64>,
    /// Maximum rows to return.
    pub limit: Option<u64>,
}

/// Live connection (or pool) that executes statements for one dialect.
///
/// Rows come back as entities keyed by column name. Implementations must
/// fail fast once closed.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Engine this provider talks to.
    fn db_type(&self) -> DbType;

    /// Dialect used to render statements for this provider.
    fn dialect(&self) -> DialectImpl {
        DialectImpl::from_db_type(self.db_type())
    }

    /// Execute one statement and return the first result set.
    async fn execute(&self, sql: &str, params: &[BoundParam]) -> Result<Vec<Entity>>;

    /// Release connections. Later `execute` calls fail.
    async fn close(&self) -> Result<()>;
}

/// Factory turning connection settings into a connected [`Provider`].
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn Provider>>;
}
