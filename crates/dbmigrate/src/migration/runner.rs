//! Runs a module's outstanding files.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use super::conf::ConnectionConf;
use super::handler::{select_handler, FileStatus, Handler, HandlerKind, StatusSink};
use super::store::MigrationStore;
use super::{FileState, MigrationFile, Module};
use crate::config::ServiceConfig;
use crate::core::traits::Connector;
use crate::error::{MigrateError, Result};

/// The file that stopped a module run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildFailure {
    pub file: String,
    pub error: String,
    /// Whether the file was marked processed with its error recorded. Files
    /// that never reached a handler stay pending.
    pub recorded: bool,
}

/// Outcome of one module run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleBuildResult {
    pub module: String,
    pub files_processed: usize,
    /// Pending files left untouched after a failure.
    pub files_remaining: usize,
    pub failure: Option<BuildFailure>,
}

impl ModuleBuildResult {
    fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            files_processed: 0,
            files_remaining: 0,
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Drives pending files of a module through their handlers.
pub struct MigrationRunner {
    store: Arc<dyn MigrationStore>,
    connector: Arc<dyn Connector>,
    service: ServiceConfig,
}

impl MigrationRunner {
    pub fn new(
        store: Arc<dyn MigrationStore>,
        connector: Arc<dyn Connector>,
        service: ServiceConfig,
    ) -> Self {
        Self {
            store,
            connector,
            service,
        }
    }

    /// Run every pending file of `module` in (submodule, filename) order,
    /// stopping at the first failure.
    ///
    /// File failures end up in the result; store failures are returned.
    pub async fn build_module(&self, module: &Module) -> Result<ModuleBuildResult> {
        info!("Building module {}", module.name);

        let files = self.store.unprocessed_files(&module.fileid).await?;
        let mut module = module.clone();
        let mut result = ModuleBuildResult::new(&module.fileid);
        let mut handlers: Vec<(HandlerKind, ConnectionConf, Handler)> = Vec::new();

        let outcome = self
            .run_files(&mut module, &files, &mut handlers, &mut result)
            .await;

        for (_, _, handler) in &handlers {
            if let Err(e) = handler.close().await {
                warn!("Failed to close handler for {}: {}", module.fileid, e);
            }
        }
        outcome?;

        if result.is_success() {
            info!(
                "Module {} built: {} files processed",
                module.fileid, result.files_processed
            );
        }
        Ok(result)
    }

    async fn run_files(
        &self,
        module: &mut Module,
        files: &[MigrationFile],
        handlers: &mut Vec<(HandlerKind, ConnectionConf, Handler)>,
        result: &mut ModuleBuildResult,
    ) -> Result<()> {
        for (idx, file) in files.iter().enumerate() {
            let extension = file.extension();
            let conf = module.conf.resolve(&file.modulename, &extension);

            let handler = match select_handler(&extension, conf.db_type) {
                Some(kind) => self.acquire(handlers, kind, conf).await,
                None => Err(MigrateError::HandlerNotFound {
                    file: file.display_name(),
                }),
            };
            let handler = match handler {
                Ok(handler) => handler,
                Err(e) => {
                    error!("Cannot run {}: {}", file.display_name(), e);
                    result.files_remaining = files.len() - idx;
                    result.failure = Some(BuildFailure {
                        file: file.display_name(),
                        error: e.to_string(),
                        recorded: false,
                    });
                    return Ok(());
                }
            };

            let mut sink = StoreStatusSink::new(self.store.as_ref(), module);
            let outcome = handlers[handler].2.execute(file, &mut sink).await;
            match outcome {
                Ok(()) => result.files_processed += 1,
                Err(e) if sink.store_failed => return Err(e),
                Err(e) => {
                    error!("{}", e);
                    result.files_remaining = files.len() - idx - 1;
                    result.failure = Some(BuildFailure {
                        file: file.display_name(),
                        error: e.to_string(),
                        recorded: true,
                    });
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Index of an open handler for (kind, conf), opening one if needed.
    async fn acquire(
        &self,
        handlers: &mut Vec<(HandlerKind, ConnectionConf, Handler)>,
        kind: HandlerKind,
        conf: ConnectionConf,
    ) -> Result<usize> {
        if let Some(idx) = handlers.iter().position(|(k, c, _)| *k == kind && *c == conf) {
            return Ok(idx);
        }
        let handler = Handler::open(kind, &conf, self.connector.as_ref(), &self.service).await?;
        handlers.push((kind, conf, handler));
        Ok(handlers.len() - 1)
    }
}

/// Persists status reports: `Ok` advances the module's `lastfileid`,
/// `Error` and `Done` mark the file processed.
struct StoreStatusSink<'a> {
    store: &'a dyn MigrationStore,
    module: &'a mut Module,
    errored: bool,
    store_failed: bool,
}

impl<'a> StoreStatusSink<'a> {
    fn new(store: &'a dyn MigrationStore, module: &'a mut Module) -> Self {
        Self {
            store,
            module,
            errored: false,
            store_failed: false,
        }
    }

    async fn apply(&mut self, file: &MigrationFile, status: FileStatus) -> Result<()> {
        match status {
            FileStatus::Ok => {
                self.module.lastfileid = Some(file.filename.clone());
                self.store.update_module(self.module).await
            }
            FileStatus::Error(message) => {
                self.errored = true;
                let mut updated = file.clone();
                updated.state = FileState::Processed;
                updated.errors = Some(message);
                self.store.update_file(&updated).await
            }
            FileStatus::Done if self.errored => Ok(()),
            FileStatus::Done => {
                self.module.lastfileid = Some(file.filename.clone());
                self.store.update_module(self.module).await?;
                let mut updated = file.clone();
                updated.state = FileState::Processed;
                updated.errors = None;
                self.store.update_file(&updated).await
            }
        }
    }
}

#[async_trait]
impl StatusSink for StoreStatusSink<'_> {
    async fn report(&mut self, file: &MigrationFile, status: FileStatus) -> Result<()> {
        let outcome = self.apply(file, status).await;
        if outcome.is_err() {
            self.store_failed = true;
        }
        outcome
    }
}
