//! MySQL/MariaDB database driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy
//! - [`MysqlProvider`]: pooled statement execution
//!
//! Supported versions: MySQL 5.7+, 8.0+ and MariaDB 10.2+.

mod dialect;
mod provider;

pub use dialect::MysqlDialect;
pub use provider::MysqlProvider;
