//! Driver catalog for explicit dependency injection.
//!
//! The [`DriverCatalog`] maps each [`DbType`] to the [`Connector`] that opens
//! providers for it. It is constructed explicitly and handed to the
//! orchestrator and runner, so tests can register fake connectors in place
//! of the real drivers.
//!
//! ```rust,ignore
//! let catalog = DriverCatalog::with_builtins();
//! let provider = catalog.connect(&config.store).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::traits::{Connector, Provider};
use crate::config::DatabaseConfig;
use crate::drivers::{DbType, MssqlProvider, MysqlProvider};
use crate::error::{MigrateError, Result};

/// Registry of connectors keyed by database type.
#[derive(Default, Clone)]
pub struct DriverCatalog {
    connectors: HashMap<DbType, Arc<dyn Connector>>,
}

impl DriverCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the MySQL and SQL Server drivers registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(DbType::Mysql, Arc::new(MysqlConnector));
        catalog.register(DbType::Mssql, Arc::new(MssqlConnector));
        catalog
    }

    /// Register (or replace) the connector for a database type.
    pub fn register(&mut self, db_type: DbType, connector: Arc<dyn Connector>) {
        debug!("Registering connector for {}", db_type);
        self.connectors.insert(db_type, connector);
    }

    /// Whether a connector is registered for `db_type`.
    pub fn supports(&self, db_type: DbType) -> bool {
        self.connectors.contains_key(&db_type)
    }
}

#[async_trait]
impl Connector for DriverCatalog {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn Provider>> {
        let connector = self.connectors.get(&config.r#type).ok_or_else(|| {
            MigrateError::Config(format!("no driver registered for {}", config.r#type))
        })?;
        connector.connect(config).await
    }
}

struct MysqlConnector;

#[async_trait]
impl Connector for MysqlConnector {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(MysqlProvider::connect(config).await?))
    }
}

struct MssqlConnector;

#[async_trait]
impl Connector for MssqlConnector {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(MssqlProvider::connect(config).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnector;

    #[test]
    fn test_builtins_cover_both_engines() {
        let catalog = DriverCatalog::with_builtins();
        assert!(catalog.supports(DbType::Mysql));
        assert!(catalog.supports(DbType::Mssql));
    }

    #[tokio::test]
    async fn test_connect_without_registration_is_config_error() {
        let catalog = DriverCatalog::new();
        let config = DatabaseConfig::new(DbType::Mysql, "localhost", "db", "root", "");
        let err = catalog.connect(&config).await.err().unwrap();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_dispatches_on_type() {
        let fake = Arc::new(FakeConnector::new());
        let mut catalog = DriverCatalog::new();
        catalog.register(DbType::Mssql, fake.clone());

        let config = DatabaseConfig::new(DbType::Mssql, "sqlhost", "db", "sa", "");
        let provider = catalog.connect(&config).await.unwrap();
        assert_eq!(provider.db_type(), DbType::Mssql);
        assert_eq!(fake.connections(), vec!["sqlhost/db".to_string()]);
    }
}
