//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB dialect and pooled provider (`mysql_async`)
//! - [`mssql`]: SQL Server dialect and single-connection provider (`tiberius`)
//!
//! Each driver module implements:
//! - `Dialect`: SQL syntax strategy for the database engine
//! - `Provider`: statement execution over a live connection

pub mod mssql;
pub mod mysql;

pub use mssql::{MssqlDialect, MssqlProvider};
pub use mysql::{MysqlDialect, MysqlProvider};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::traits::{Dialect, SelectQueryOptions};
use crate::error::{MigrateError, Result};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    #[serde(alias = "mariadb")]
    Mysql,
    #[serde(alias = "sqlserver")]
    Mssql,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Mysql => "mysql",
            DbType::Mssql => "mssql",
        }
    }

    /// Default TCP port for the engine.
    pub fn default_port(&self) -> u16 {
        match self {
            DbType::Mysql => 3306,
            DbType::Mssql => 1433,
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DbType::Mysql),
            "mssql" | "sqlserver" => Ok(DbType::Mssql),
            other => Err(MigrateError::Config(format!(
                "unsupported database type '{}'",
                other
            ))),
        }
    }
}

/// Enum-based static dispatch for dialects.
///
/// The compiler generates a match instead of vtable dispatch, and the
/// builder can hold a dialect by value.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mysql(MysqlDialect),
    Mssql(MssqlDialect),
}

impl DialectImpl {
    /// Dialect for a database type.
    pub fn from_db_type(db_type: DbType) -> Self {
        match db_type {
            DbType::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
            DbType::Mssql => DialectImpl::Mssql(MssqlDialect::new()),
        }
    }
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        match self {
            DialectImpl::Mysql(d) => d.name(),
            DialectImpl::Mssql(d) => d.name(),
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        match self {
            DialectImpl::Mysql(d) => d.quote_ident(name),
            DialectImpl::Mssql(d) => d.quote_ident(name),
        }
    }

    fn param_marker(&self, name: &str) -> String {
        match self {
            DialectImpl::Mysql(d) => d.param_marker(name),
            DialectImpl::Mssql(d) => d.param_marker(name),
        }
    }

    fn build_select_query(&self, opts: &SelectQueryOptions) -> String {
        match self {
            DialectImpl::Mysql(d) => d.build_select_query(opts),
            DialectImpl::Mssql(d) => d.build_select_query(opts),
        }
    }
}
