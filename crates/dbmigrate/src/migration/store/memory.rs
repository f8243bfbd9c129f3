//! In-memory store, used for dry runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::MigrationStore;
use crate::error::{MigrateError, Result};
use crate::migration::{FileState, MigrationFile, Module};

type FileKey = (String, String, String);

fn key(parentid: &str, modulename: &str, filename: &str) -> FileKey {
    (parentid.to_string(), modulename.to_string(), filename.to_string())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    modules: Mutex<BTreeMap<String, Module>>,
    files: Mutex<BTreeMap<FileKey, MigrationFile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MigrationStore for MemoryStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_module(&self, fileid: &str) -> Result<Option<Module>> {
        Ok(self.modules.lock().await.get(fileid).cloned())
    }

    async fn list_modules(&self) -> Result<Vec<Module>> {
        let mut modules: Vec<_> = self.modules.lock().await.values().cloned().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(modules)
    }

    async fn create_module(&self, module: &Module) -> Result<()> {
        let mut modules = self.modules.lock().await;
        if modules.contains_key(&module.fileid) {
            return Err(MigrateError::Validation(format!(
                "module {} already exists",
                module.fileid
            )));
        }
        modules.insert(module.fileid.clone(), module.clone());
        Ok(())
    }

    async fn update_module(&self, module: &Module) -> Result<()> {
        let mut modules = self.modules.lock().await;
        match modules.get_mut(&module.fileid) {
            Some(existing) => {
                *existing = module.clone();
                Ok(())
            }
            None => Err(MigrateError::ModuleNotFound(module.fileid.clone())),
        }
    }

    async fn file_exists(&self, parentid: &str, modulename: &str, filename: &str) -> Result<bool> {
        Ok(self
            .files
            .lock()
            .await
            .contains_key(&key(parentid, modulename, filename)))
    }

    async fn create_file(&self, file: &MigrationFile) -> Result<()> {
        let mut files = self.files.lock().await;
        let k = key(&file.parentid, &file.modulename, &file.filename);
        if files.contains_key(&k) {
            return Err(MigrateError::Validation(format!(
                "{} is already tracked",
                file.display_name()
            )));
        }
        files.insert(k, file.clone());
        Ok(())
    }

    async fn update_file(&self, file: &MigrationFile) -> Result<()> {
        let mut files = self.files.lock().await;
        let k = key(&file.parentid, &file.modulename, &file.filename);
        match files.get_mut(&k) {
            Some(existing) => {
                *existing = file.clone();
                Ok(())
            }
            None => Err(MigrateError::Validation(format!(
                "{} is not tracked",
                file.display_name()
            ))),
        }
    }

    async fn module_files(&self, parentid: &str) -> Result<Vec<MigrationFile>> {
        Ok(self
            .files
            .lock()
            .await
            .values()
            .filter(|f| f.parentid == parentid)
            .cloned()
            .collect())
    }

    async fn unprocessed_files(&self, parentid: &str) -> Result<Vec<MigrationFile>> {
        Ok(self
            .module_files(parentid)
            .await?
            .into_iter()
            .filter(|f| f.state == FileState::Unprocessed)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::ModuleConf;

    fn module(fileid: &str) -> Module {
        Module {
            fileid: fileid.into(),
            name: fileid.into(),
            dbname: fileid.into(),
            dir: fileid.into(),
            conf: ModuleConf::default(),
            lastfileid: None,
        }
    }

    #[tokio::test]
    async fn test_modules_ordered_and_unique() {
        let store = MemoryStore::new();
        store.create_module(&module("b")).await.unwrap();
        store.create_module(&module("a")).await.unwrap();
        assert!(store.create_module(&module("a")).await.is_err());

        let names: Vec<_> = store.list_modules().await.unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(store.update_module(&module("zzz")).await.is_err());
    }

    #[tokio::test]
    async fn test_files_ordered_by_submodule_then_name() {
        let store = MemoryStore::new();
        for (sub, name) in [("x", "001.sql"), ("", "002.sql"), ("", "001.sql")] {
            store
                .create_file(&MigrationFile::new("m", sub, name, name))
                .await
                .unwrap();
        }
        store.create_file(&MigrationFile::new("other", "", "001.sql", "o")).await.unwrap();

        let mut done = MigrationFile::new("m", "", "001.sql", "001.sql");
        done.state = FileState::Processed;
        store.update_file(&done).await.unwrap();

        let all: Vec<_> = store
            .module_files("m")
            .await
            .unwrap()
            .into_iter()
            .map(|f| format!("{}/{}", f.modulename, f.filename))
            .collect();
        assert_eq!(all, vec!["/001.sql", "/002.sql", "x/001.sql"]);

        let pending = store.unprocessed_files("m").await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].filename, "002.sql");
        assert!(store.file_exists("m", "x", "001.sql").await.unwrap());
        assert!(!store.file_exists("m", "", "003.sql").await.unwrap());
    }
}
