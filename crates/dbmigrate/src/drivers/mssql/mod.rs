//! Microsoft SQL Server database driver.
//!
//! - [`MssqlDialect`]: SQL syntax strategy
//! - [`MssqlProvider`]: single-connection statement execution with typed binds

mod dialect;
mod provider;

pub use dialect::MssqlDialect;
pub use provider::MssqlProvider;
