//! Persisted module and file state.

mod db;
mod memory;

pub use db::DbMigrationStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use super::{MigrationFile, Module};
use crate::error::Result;

/// Storage of `Module` and `MigrationFile` records.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Create the backing tables if they do not exist.
    async fn init_schema(&self) -> Result<()>;

    /// Round trip to the backing store.
    async fn ping(&self) -> Result<()>;

    async fn find_module(&self, fileid: &str) -> Result<Option<Module>>;

    /// Every module, ordered by name.
    async fn list_modules(&self) -> Result<Vec<Module>>;

    async fn create_module(&self, module: &Module) -> Result<()>;

    async fn update_module(&self, module: &Module) -> Result<()>;

    async fn file_exists(&self, parentid: &str, modulename: &str, filename: &str) -> Result<bool>;

    async fn create_file(&self, file: &MigrationFile) -> Result<()>;

    async fn update_file(&self, file: &MigrationFile) -> Result<()>;

    /// Every file of a module, ordered by (submodule, filename).
    async fn module_files(&self, parentid: &str) -> Result<Vec<MigrationFile>>;

    /// State-0 files of a module, ordered by (submodule, filename).
    async fn unprocessed_files(&self, parentid: &str) -> Result<Vec<MigrationFile>>;

    /// Release the backing connection.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
