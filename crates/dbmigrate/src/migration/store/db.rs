//! Database-backed store on the `dbm_module` and `dbm_migration` tables.
//!
//! Records go through the same [`Persistence`] facade as any other entity,
//! so both engines share one code path and differ only in their DDL.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::MigrationStore;
use crate::builder::Filter;
use crate::core::traits::Provider;
use crate::core::value::{from_entity, to_entity, Entity};
use crate::drivers::DbType;
use crate::error::Result;
use crate::migration::{MigrationFile, Module};
use crate::persistence::Persistence;
use crate::schema::{SchemaRegistry, MIGRATION_SCHEMA, MODULE_SCHEMA};

const MYSQL_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS dbm_module (
        `fileid` VARCHAR(255) NOT NULL,
        `name` VARCHAR(255) NOT NULL,
        `dbname` VARCHAR(255) NULL,
        `dir` VARCHAR(1024) NULL,
        `conf` TEXT NULL,
        `lastfileid` VARCHAR(255) NULL,
        PRIMARY KEY (`fileid`)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
    "CREATE TABLE IF NOT EXISTS dbm_migration (
        `parentid` VARCHAR(255) NOT NULL,
        `modulename` VARCHAR(255) NOT NULL DEFAULT '',
        `filename` VARCHAR(255) NOT NULL,
        `file` VARCHAR(1024) NULL,
        `dtfiled` DATETIME NULL,
        `state` INT NOT NULL DEFAULT 0,
        `errors` TEXT NULL,
        PRIMARY KEY (`parentid`, `modulename`, `filename`)
    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
];

const MSSQL_DDL: &[&str] = &[
    "IF NOT EXISTS (SELECT 1 FROM sys.tables WHERE name = 'dbm_module')
    CREATE TABLE dbm_module (
        [fileid] NVARCHAR(255) NOT NULL,
        [name] NVARCHAR(255) NOT NULL,
        [dbname] NVARCHAR(255) NULL,
        [dir] NVARCHAR(1024) NULL,
        [conf] NVARCHAR(MAX) NULL,
        [lastfileid] NVARCHAR(255) NULL,
        CONSTRAINT pk_dbm_module PRIMARY KEY ([fileid])
    )",
    "IF NOT EXISTS (SELECT 1 FROM sys.tables WHERE name = 'dbm_migration')
    CREATE TABLE dbm_migration (
        [parentid] NVARCHAR(255) NOT NULL,
        [modulename] NVARCHAR(255) NOT NULL DEFAULT '',
        [filename] NVARCHAR(255) NOT NULL,
        [file] NVARCHAR(1024) NULL,
        [dtfiled] DATETIME NULL,
        [state] INT NOT NULL DEFAULT 0,
        [errors] NVARCHAR(MAX) NULL,
        CONSTRAINT pk_dbm_migration PRIMARY KEY ([parentid], [modulename], [filename])
    )",
];

/// Migration store persisted in the configured store database.
pub struct DbMigrationStore {
    provider: Arc<dyn Provider>,
    modules: Persistence,
    files: Persistence,
}

impl DbMigrationStore {
    pub fn new(provider: Arc<dyn Provider>, registry: &SchemaRegistry) -> Result<Self> {
        let modules = Persistence::new(provider.clone(), registry.get(MODULE_SCHEMA)?);
        let files = Persistence::new(provider.clone(), registry.get(MIGRATION_SCHEMA)?);
        Ok(Self {
            provider,
            modules,
            files,
        })
    }

    fn ddl(&self) -> &'static [&'static str] {
        match self.provider.db_type() {
            DbType::Mysql => MYSQL_DDL,
            DbType::Mssql => MSSQL_DDL,
        }
    }
}

fn entity(value: Value) -> Entity {
    match value {
        Value::Object(map) => map,
        _ => Entity::new(),
    }
}

fn file_key(parentid: &str, modulename: &str, filename: &str) -> Entity {
    entity(json!({
        "parentid": parentid,
        "modulename": modulename,
        "filename": filename,
    }))
}

fn decode_all<T: serde::de::DeserializeOwned>(rows: Vec<Entity>) -> Result<Vec<T>> {
    rows.into_iter().map(from_entity).collect()
}

#[async_trait]
impl MigrationStore for DbMigrationStore {
    async fn init_schema(&self) -> Result<()> {
        for ddl in self.ddl() {
            self.provider.execute(ddl, &[]).await?;
        }
        info!("Migration store tables ready ({})", self.provider.db_type());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.provider.execute("SELECT 1", &[]).await?;
        Ok(())
    }

    async fn find_module(&self, fileid: &str) -> Result<Option<Module>> {
        self.modules
            .read(&entity(json!({ "fileid": fileid })))
            .await?
            .map(from_entity)
            .transpose()
    }

    async fn list_modules(&self) -> Result<Vec<Module>> {
        decode_all(self.modules.query().order_by("name").list().await?)
    }

    async fn create_module(&self, module: &Module) -> Result<()> {
        self.modules.create(&to_entity(module)?).await
    }

    async fn update_module(&self, module: &Module) -> Result<()> {
        self.modules.update(&to_entity(module)?).await
    }

    async fn file_exists(&self, parentid: &str, modulename: &str, filename: &str) -> Result<bool> {
        let found = self
            .files
            .query()
            .select("parentid")
            .find(file_key(parentid, modulename, filename))
            .first()
            .await?;
        Ok(found.is_some())
    }

    async fn create_file(&self, file: &MigrationFile) -> Result<()> {
        self.files.create(&to_entity(file)?).await
    }

    async fn update_file(&self, file: &MigrationFile) -> Result<()> {
        self.files.update(&to_entity(file)?).await
    }

    async fn module_files(&self, parentid: &str) -> Result<Vec<MigrationFile>> {
        let rows = self
            .files
            .query()
            .find(entity(json!({ "parentid": parentid })))
            .order_by("modulename, filename")
            .list()
            .await?;
        decode_all(rows)
    }

    async fn unprocessed_files(&self, parentid: &str) -> Result<Vec<MigrationFile>> {
        let rows = self
            .files
            .query()
            .filter(Filter::bound(
                "parentid = :parentid AND state = 0",
                entity(json!({ "parentid": parentid })),
            ))
            .order_by("modulename, filename")
            .list()
            .await?;
        decode_all(rows)
    }

    async fn close(&self) -> Result<()> {
        self.provider.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::FieldType;
    use crate::core::value::BoundParam;
    use crate::migration::{FileState, ModuleConf};
    use crate::testing::RecordingProvider;

    fn make_store(db_type: DbType) -> (Arc<RecordingProvider>, DbMigrationStore) {
        let provider = Arc::new(RecordingProvider::new(db_type));
        let registry = SchemaRegistry::builtin().unwrap();
        let store = DbMigrationStore::new(provider.clone(), &registry).unwrap();
        (provider, store)
    }

    #[tokio::test]
    async fn test_init_schema_uses_dialect_ddl() {
        let (provider, store) = make_store(DbType::Mssql);
        store.init_schema().await.unwrap();
        let sql = provider.statements();
        assert_eq!(sql.len(), 2);
        assert!(sql[0].starts_with("IF NOT EXISTS (SELECT 1 FROM sys.tables WHERE name = 'dbm_module')"));
        assert!(sql[1].contains("PRIMARY KEY ([parentid], [modulename], [filename])"));

        let (provider, store) = make_store(DbType::Mysql);
        store.init_schema().await.unwrap();
        assert!(provider.statements()[0].starts_with("CREATE TABLE IF NOT EXISTS dbm_module"));
    }

    #[tokio::test]
    async fn test_create_module_encodes_conf() {
        let (provider, store) = make_store(DbType::Mysql);
        let module = Module {
            fileid: "etracs".into(),
            name: "etracs".into(),
            dbname: "etracs".into(),
            dir: "/m/etracs".into(),
            conf: ModuleConf::default(),
            lastfileid: None,
        };
        store.create_module(&module).await.unwrap();

        let call = &provider.calls()[0];
        assert_eq!(
            call.sql,
            "INSERT INTO dbm_module (`fileid`,`name`,`dbname`,`dir`,`conf`,`lastfileid`) VALUES(?,?,?,?,?,?)"
        );
        assert_eq!(call.params[4], BoundParam::new("conf", json!("[]"), FieldType::Json));
    }

    #[tokio::test]
    async fn test_find_module_decodes_row() {
        let (provider, store) = make_store(DbType::Mysql);
        provider.push_rows(vec![entity(json!({
            "fileid": "etracs",
            "name": "etracs",
            "dbname": "etracs_db",
            "dir": "/m/etracs",
            "conf": "[{\"submodule\":\"\",\"extension\":\"\",\"settings\":{\"db_name\":\"etracs_db\"}}]",
            "lastfileid": null,
        }))]);

        let module = store.find_module("etracs").await.unwrap().unwrap();
        assert_eq!(module.dbname, "etracs_db");
        assert_eq!(module.conf.database(), Some("etracs_db"));
        assert_eq!(provider.calls()[0].sql, "SELECT * FROM dbm_module WHERE `fileid`=?");

        assert!(store.find_module("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_queries() {
        let (provider, store) = make_store(DbType::Mssql);
        provider.push_rows(vec![entity(json!({"parentid": "m"}))]);
        provider.push_rows(vec![entity(json!({
            "parentid": "m",
            "modulename": "",
            "filename": "001.sql",
            "file": "/m/001.sql",
            "dtfiled": "2024-01-02 03:04:05",
            "state": "0",
            "errors": null,
        }))]);

        assert!(store.file_exists("m", "", "001.sql").await.unwrap());
        let pending = store.unprocessed_files("m").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].state, FileState::Unprocessed);

        let sql = provider.statements();
        assert_eq!(
            sql[0],
            "SELECT TOP 1 [parentid] FROM dbm_migration WHERE [parentid]=@parentid AND [modulename]=@modulename AND [filename]=@filename"
        );
        assert_eq!(
            sql[1],
            "SELECT * FROM dbm_migration WHERE [parentid] = @parentid AND [state] = 0 ORDER BY modulename, filename"
        );
    }

    #[tokio::test]
    async fn test_update_file_by_identity() {
        let (provider, store) = make_store(DbType::Mysql);
        let mut file = MigrationFile::new("m", "sub", "001.sql", "/m/sub/001.sql");
        file.state = FileState::Processed;
        file.errors = Some("boom".into());
        store.update_file(&file).await.unwrap();

        let call = &provider.calls()[0];
        assert_eq!(
            call.sql,
            "UPDATE dbm_migration SET `file`=?, `dtfiled`=?, `state`=?, `errors`=? WHERE `parentid`=? AND `modulename`=? AND `filename`=?"
        );
        assert_eq!(call.params[2].value, json!(1));
        assert_eq!(call.params[3].value, json!("boom"));
    }
}
