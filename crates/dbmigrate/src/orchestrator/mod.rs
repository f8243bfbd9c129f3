//! Orchestrator - main workflow coordinator.
//!
//! Wires the configuration, schema registry, migration store and driver
//! catalog together and exposes the operations the CLI drives.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::catalog::DriverCatalog;
use crate::core::traits::Connector;
use crate::error::{MigrateError, Result};
use crate::migration::{
    group_files, register_modules, scan, scan_filtered, DbMigrationStore, FileGroup,
    MigrationFile, MigrationRunner, MigrationStore, Module, ModuleBuildResult,
    RegistrationSummary, ScanOptions,
};
use crate::schema::SchemaRegistry;

/// Application facade over the migration engine.
pub struct Orchestrator {
    config: Config,
    registry: SchemaRegistry,
    store: Arc<dyn MigrationStore>,
    runner: MigrationRunner,
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub store_connected: bool,
    pub store_latency_ms: u64,
    pub store_error: Option<String>,
    pub modules_root_exists: bool,
    pub schemas_loaded: usize,
}

impl HealthCheckResult {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Connect to the configured store database and create its tables.
    pub async fn new(config: Config) -> Result<Self> {
        let registry = load_registry(&config)?;
        let catalog = Arc::new(DriverCatalog::with_builtins());

        let provider = catalog.connect(&config.store).await?;
        info!(
            "Connected to migration store {}/{} ({})",
            config.store.host, config.store.database, config.store.r#type
        );
        let store = Arc::new(DbMigrationStore::new(provider, &registry)?);
        store.init_schema().await?;

        Ok(Self::assemble(config, registry, store, catalog))
    }

    /// Build from an already opened store and connector.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn MigrationStore>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let registry = load_registry(&config)?;
        Ok(Self::assemble(config, registry, store, connector))
    }

    fn assemble(
        config: Config,
        registry: SchemaRegistry,
        store: Arc<dyn MigrationStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let runner = MigrationRunner::new(store.clone(), connector, config.service.clone());
        Self {
            config,
            registry,
            store,
            runner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions::from(&self.config.scan)
    }

    /// Scan the modules root and register every module and new file.
    pub async fn load_modules(&self) -> Result<RegistrationSummary> {
        let root = &self.config.paths.root;
        if !root.is_dir() {
            return Err(MigrateError::Config(format!(
                "modules root {} is not a directory",
                root.display()
            )));
        }

        let options = self.scan_options();
        let modules = scan(root, &options)?;
        info!("Scanned {} modules under {}", modules.len(), root.display());

        let summary = register_modules(self.store.as_ref(), &modules, &options).await?;
        info!(
            "Registration complete: {} created, {} refreshed, {} new files",
            summary.modules_created, summary.modules_refreshed, summary.files_added
        );
        Ok(summary)
    }

    /// Rescan a single top-level module by directory name.
    pub async fn reload_module(&self, name: &str) -> Result<RegistrationSummary> {
        let options = self.scan_options();
        let modules = scan_filtered(&self.config.paths.root, &options, |dir| dir == name)?;
        if modules.is_empty() {
            return Err(MigrateError::ModuleNotFound(name.to_string()));
        }
        register_modules(self.store.as_ref(), &modules, &options).await
    }

    /// Every registered module, ordered by name.
    pub async fn modules(&self) -> Result<Vec<Module>> {
        self.store.list_modules().await
    }

    pub async fn module(&self, fileid: &str) -> Result<Module> {
        self.store
            .find_module(fileid)
            .await?
            .ok_or_else(|| MigrateError::ModuleNotFound(fileid.to_string()))
    }

    /// Files of a module grouped by submodule.
    pub async fn module_files(&self, fileid: &str) -> Result<Vec<FileGroup>> {
        let module = self.module(fileid).await?;
        let files = self.store.module_files(&module.fileid).await?;
        Ok(group_files(&module.name, files))
    }

    pub async fn update_module(&self, module: &Module) -> Result<()> {
        self.store.update_module(module).await
    }

    pub async fn update_file(&self, file: &MigrationFile) -> Result<()> {
        self.store.update_file(file).await
    }

    /// Run the pending files of one module.
    pub async fn build_module(&self, fileid: &str) -> Result<ModuleBuildResult> {
        let module = self.module(fileid).await?;
        self.runner.build_module(&module).await
    }

    /// Run every registered module in name order. A failed module does not
    /// stop the ones after it.
    pub async fn build_modules(&self) -> Result<Vec<ModuleBuildResult>> {
        let modules = self.store.list_modules().await?;
        let mut results = Vec::with_capacity(modules.len());

        for module in &modules {
            let result = self.runner.build_module(module).await?;
            if let Some(failure) = &result.failure {
                error!(
                    "Module {} stopped at {}: {}",
                    module.fileid, failure.file, failure.error
                );
            }
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            warn!("{} of {} modules failed", failed, results.len());
        }
        Ok(results)
    }

    /// Check store connectivity and the modules root.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let (store_connected, store_error) = match self.store.ping().await {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        let store_latency_ms = start.elapsed().as_millis() as u64;
        let modules_root_exists = self.config.paths.root.is_dir();

        Ok(HealthCheckResult {
            healthy: store_connected && modules_root_exists,
            store_connected,
            store_latency_ms,
            store_error,
            modules_root_exists,
            schemas_loaded: self.registry.len(),
        })
    }

    /// Release the store connection.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

/// Built-in schemas plus any descriptors under `paths.schemas`.
pub fn load_registry(config: &Config) -> Result<SchemaRegistry> {
    let mut builder = SchemaRegistry::builder().with_builtins()?;
    if let Some(dir) = &config.paths.schemas {
        builder = builder.load_dir(dir)?;
    }
    let registry = builder.build()?;
    info!("Loaded {} schemas", registry.len());
    Ok(registry)
}
