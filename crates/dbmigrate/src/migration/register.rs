//! Reconciles a scan with the migration store.

use serde::Serialize;
use tracing::info;

use super::conf::ModuleConf;
use super::scanner::{ScanOptions, ScannedModule};
use super::store::MigrationStore;
use super::{MigrationFile, Module};
use crate::error::Result;

/// Counts from one registration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationSummary {
    pub modules_created: usize,
    pub modules_refreshed: usize,
    pub files_added: usize,
    pub files_existing: usize,
}

impl RegistrationSummary {
    fn absorb(&mut self, other: RegistrationSummary) {
        self.modules_created += other.modules_created;
        self.modules_refreshed += other.modules_refreshed;
        self.files_added += other.files_added;
        self.files_existing += other.files_existing;
    }
}

/// Create or refresh each scanned top-level module and start tracking the
/// files the store has not seen yet. Tracked files are never modified.
pub async fn register_modules(
    store: &dyn MigrationStore,
    modules: &[ScannedModule],
    options: &ScanOptions,
) -> Result<RegistrationSummary> {
    let mut summary = RegistrationSummary::default();
    for scanned in modules {
        summary.absorb(register_module(store, scanned, options).await?);
    }
    Ok(summary)
}

async fn register_module(
    store: &dyn MigrationStore,
    scanned: &ScannedModule,
    options: &ScanOptions,
) -> Result<RegistrationSummary> {
    let mut summary = RegistrationSummary::default();
    let conf = ModuleConf::from_scan(scanned, options)?;

    match store.find_module(&scanned.fileid).await? {
        None => {
            let module = Module {
                fileid: scanned.fileid.clone(),
                name: scanned.name.clone(),
                dbname: conf.database().unwrap_or(&scanned.name).to_string(),
                dir: scanned.dir.clone(),
                conf,
                lastfileid: None,
            };
            store.create_module(&module).await?;
            info!("Module {} registered", module.fileid);
            summary.modules_created += 1;
        }
        Some(mut module) => {
            module.conf.merge(&conf);
            module.dbname = module.conf.database().unwrap_or(&scanned.name).to_string();
            module.dir = scanned.dir.clone();
            store.update_module(&module).await?;
            summary.modules_refreshed += 1;
        }
    }

    for (submodule, level) in scanned.levels() {
        for file in &level.files {
            if store
                .file_exists(&scanned.fileid, &submodule, &file.name)
                .await?
            {
                summary.files_existing += 1;
                continue;
            }
            let record = MigrationFile::new(&scanned.fileid, &submodule, &file.name, &file.path);
            store.create_file(&record).await?;
            info!("{} file: {} saved.", record.module_fileid(), record.filename);
            summary.files_added += 1;
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::scanner::scan;
    use crate::migration::store::MemoryStore;
    use crate::migration::FileState;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    async fn register(root: &Path, store: &MemoryStore) -> RegistrationSummary {
        let options = ScanOptions::default();
        let modules = scan(root, &options).unwrap();
        register_modules(store, &modules, &options).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_scan_registers_everything() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "etracs/env.conf", "db_type=mysql\ndb_name=etracs_db\n");
        write(dir.path(), "etracs/migrations/001.sql", "SELECT 1;");
        write(dir.path(), "etracs/rpt/001.sql", "SELECT 1;");
        write(dir.path(), "etracs/rpt/env.conf", "db_host=rpt\n");
        write(dir.path(), "bpls/001.sql", "SELECT 1;");

        let store = MemoryStore::new();
        let summary = register(dir.path(), &store).await;
        assert_eq!(
            summary,
            RegistrationSummary {
                modules_created: 2,
                modules_refreshed: 0,
                files_added: 3,
                files_existing: 0,
            }
        );

        let etracs = store.find_module("etracs").await.unwrap().unwrap();
        assert_eq!(etracs.dbname, "etracs_db");
        assert_eq!(etracs.conf.get("rpt", "").unwrap().db_host.as_deref(), Some("rpt"));
        let bpls = store.find_module("bpls").await.unwrap().unwrap();
        assert_eq!(bpls.dbname, "bpls");

        let files = store.module_files("etracs").await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].modulename, "");
        assert_eq!(files[1].modulename, "rpt");
        assert!(files.iter().all(|f| f.state == FileState::Unprocessed));
        assert!(store.find_module("etracs.rpt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flattened_submodule_files_keep_parent_identity() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "module1/migrations/000.sql", "SELECT 0;");
        write(dir.path(), "module1/migrations/submodule1/001.sql", "SELECT 1;");

        let store = MemoryStore::new();
        let summary = register(dir.path(), &store).await;
        assert_eq!(summary.modules_created, 1);
        assert_eq!(summary.files_added, 2);

        let files = store.module_files("module1").await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].parentid, "module1");
        assert_eq!(files[0].modulename, "");
        assert_eq!(files[0].filename, "000.sql");
        assert_eq!(files[1].parentid, "module1");
        assert_eq!(files[1].modulename, "submodule1");
        assert_eq!(files[1].filename, "001.sql");
        assert!(store.find_module("module1.submodule1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rescan_is_idempotent_and_keeps_state() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "m/env.conf", "db_type=mysql\ndb_host=old\n");
        write(dir.path(), "m/001.sql", "SELECT 1;");

        let store = MemoryStore::new();
        register(dir.path(), &store).await;

        let mut file = store.module_files("m").await.unwrap().remove(0);
        file.state = FileState::Processed;
        file.errors = Some("boom".into());
        store.update_file(&file).await.unwrap();

        write(dir.path(), "m/env.conf", "db_type=mysql\ndb_host=new\n");
        write(dir.path(), "m/002.sql", "SELECT 2;");
        let summary = register(dir.path(), &store).await;
        assert_eq!(summary.modules_refreshed, 1);
        assert_eq!(summary.files_added, 1);
        assert_eq!(summary.files_existing, 1);

        let files = store.module_files("m").await.unwrap();
        assert_eq!(files[0].state, FileState::Processed);
        assert_eq!(files[0].errors.as_deref(), Some("boom"));
        assert_eq!(files[1].state, FileState::Unprocessed);

        let module = store.find_module("m").await.unwrap().unwrap();
        assert_eq!(module.conf.get("", "").unwrap().db_host.as_deref(), Some("new"));

        let summary = register(dir.path(), &store).await;
        assert_eq!(summary.files_added, 0);
        assert_eq!(summary.files_existing, 2);
    }
}
