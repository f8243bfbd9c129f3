//! # dbmigrate
//!
//! Directory-driven database migration library for MySQL and SQL Server.
//!
//! Migration scripts live in a tree of module directories. Each module is
//! scanned, its files are tracked in a store database, and pending files are
//! run in order against the database (or application service) the module's
//! `.conf` files point at:
//!
//! - **Schema registry** of XML entity descriptors
//! - **SQL builder** with MySQL and SQL Server dialects
//! - **Persistence facade** for entity CRUD and named SQL files
//! - **Migration engine** that scans, registers and runs scripts
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbmigrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> dbmigrate::Result<()> {
//!     let config = Config::load("dbmigrate.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     orchestrator.load_modules().await?;
//!     for result in orchestrator.build_modules().await? {
//!         println!("{}: {} files", result.module, result.files_processed);
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod migration;
pub mod orchestrator;
pub mod persistence;
pub mod schema;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use builder::{Filter, QueryParams, SqlBuilder};
pub use config::{Config, DatabaseConfig};
pub use core::{Connector, DriverCatalog, Entity, Provider, Schema, Statement};
pub use drivers::DbType;
pub use error::{MigrateError, Result};
pub use migration::{MigrationFile, MigrationStore, Module, ModuleBuildResult, RegistrationSummary};
pub use orchestrator::{load_registry, HealthCheckResult, Orchestrator};
pub use persistence::{NamedSql, Persistence};
pub use schema::SchemaRegistry;
