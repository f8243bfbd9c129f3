//! Module connection settings.
//!
//! Conf files are `key=value` lines. `env.conf` holds the defaults of one
//! module level, `<ext>.conf` the settings for files with that extension.
//! A module keeps every level's settings in one [`ModuleConf`] keyed by
//! (submodule, extension).

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DatabaseConfig;
use crate::drivers::DbType;
use crate::error::{MigrateError, Result};

use super::scanner::{ScanOptions, ScannedModule};

/// Connection settings from one conf file. Every key is optional so that
/// later levels can override single values.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConf {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_type: Option<DbType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_pass: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_context: Option<String>,
}

impl ConnectionConf {
    /// Parse `key=value` text. Blank lines and `#` comments are skipped;
    /// unknown keys are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut conf = Self::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(MigrateError::Config(format!(
                    "line {}: expected key=value, got '{}'",
                    lineno + 1,
                    line
                )));
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let text = Some(value.to_string());
            match key.as_str() {
                "db_type" => conf.db_type = Some(value.parse()?),
                "db_host" => conf.db_host = text,
                "db_port" => {
                    conf.db_port = Some(value.parse().map_err(|_| {
                        MigrateError::Config(format!("db_port '{}' is not a port number", value))
                    })?)
                }
                "db_user" => conf.db_user = text,
                "db_pass" => conf.db_pass = text,
                "db_name" => conf.db_name = text,
                "app_server" => conf.app_server = text,
                "app_cluster" => conf.app_cluster = text,
                "app_context" => conf.app_context = text,
                other => warn!("Ignoring unknown conf key {}", other),
            }
        }
        Ok(conf)
    }

    /// Read and parse a conf file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text).map_err(|e| match e {
            MigrateError::Config(msg) => {
                MigrateError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Copy every value `other` sets over this one.
    pub fn overlay(&mut self, other: &ConnectionConf) {
        fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if src.is_some() {
                dst.clone_from(src);
            }
        }
        take(&mut self.db_type, &other.db_type);
        take(&mut self.db_host, &other.db_host);
        take(&mut self.db_port, &other.db_port);
        take(&mut self.db_user, &other.db_user);
        take(&mut self.db_pass, &other.db_pass);
        take(&mut self.db_name, &other.db_name);
        take(&mut self.app_server, &other.app_server);
        take(&mut self.app_cluster, &other.app_cluster);
        take(&mut self.app_context, &other.app_context);
    }

    /// Database connection described by these settings.
    pub fn to_database_config(&self) -> Result<DatabaseConfig> {
        let db_type = self
            .db_type
            .ok_or_else(|| MigrateError::Config("db_type is not set".into()))?;
        let host = self
            .db_host
            .clone()
            .ok_or_else(|| MigrateError::Config("db_host is not set".into()))?;
        let database = self
            .db_name
            .clone()
            .ok_or_else(|| MigrateError::Config("db_name is not set".into()))?;

        let mut config = DatabaseConfig::new(
            db_type,
            host,
            database,
            self.db_user.clone().unwrap_or_default(),
            self.db_pass.clone().unwrap_or_default(),
        );
        config.port = self.db_port;
        Ok(config)
    }

    /// Base URL for service scripts: `http://{server}/{cluster}/json/{context}`.
    pub fn service_endpoint(&self) -> Result<String> {
        let require = |value: &Option<String>, key: &str| {
            value
                .clone()
                .ok_or_else(|| MigrateError::Config(format!("{} is not set", key)))
        };
        Ok(format!(
            "http://{}/{}/json/{}",
            require(&self.app_server, "app_server")?,
            require(&self.app_cluster, "app_cluster")?,
            require(&self.app_context, "app_context")?
        ))
    }
}

impl fmt::Debug for ConnectionConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConf")
            .field("db_type", &self.db_type)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_user", &self.db_user)
            .field("db_pass", &self.db_pass.as_ref().map(|_| "[REDACTED]"))
            .field("db_name", &self.db_name)
            .field("app_server", &self.app_server)
            .field("app_cluster", &self.app_cluster)
            .field("app_context", &self.app_context)
            .finish()
    }
}

/// Settings of one (submodule, extension) slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfEntry {
    /// Dotted submodule path relative to the module, empty for the module itself.
    #[serde(default)]
    pub submodule: String,
    /// File extension the settings apply to, empty for the level default.
    #[serde(default)]
    pub extension: String,
    pub settings: ConnectionConf,
}

/// All connection settings of a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleConf {
    entries: Vec<ConfEntry>,
}

impl ModuleConf {
    pub fn entries(&self) -> &[ConfEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store settings for a slot, replacing what was there.
    pub fn set(&mut self, submodule: &str, extension: &str, settings: ConnectionConf) {
        let extension = extension.to_lowercase();
        match self
            .entries
            .iter_mut()
            .find(|e| e.submodule == submodule && e.extension == extension)
        {
            Some(entry) => entry.settings = settings,
            None => self.entries.push(ConfEntry {
                submodule: submodule.to_string(),
                extension,
                settings,
            }),
        }
    }

    pub fn get(&self, submodule: &str, extension: &str) -> Option<&ConnectionConf> {
        self.entries
            .iter()
            .find(|e| e.submodule == submodule && e.extension.eq_ignore_ascii_case(extension))
            .map(|e| &e.settings)
    }

    /// Take every slot of `newer`; slots it lacks are kept.
    pub fn merge(&mut self, newer: &ModuleConf) {
        for entry in &newer.entries {
            self.set(&entry.submodule, &entry.extension, entry.settings.clone());
        }
    }

    /// Effective settings for a file with extension `extension` in `submodule`.
    ///
    /// Overlays, in order: the module default, the module's extension entry,
    /// then for each ancestor level (`a`, `a.b`, ...) its default and its
    /// extension entry.
    pub fn resolve(&self, submodule: &str, extension: &str) -> ConnectionConf {
        let mut levels = vec![String::new()];
        let mut path = String::new();
        for part in submodule.split('.').filter(|p| !p.is_empty()) {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(part);
            levels.push(path.clone());
        }

        let mut resolved = ConnectionConf::default();
        for level in &levels {
            for ext in ["", extension] {
                if let Some(settings) = self.get(level, ext) {
                    resolved.overlay(settings);
                }
                if extension.is_empty() {
                    break;
                }
            }
        }
        resolved
    }

    /// Database name declared by the module's default settings.
    pub fn database(&self) -> Option<&str> {
        self.get("", "").and_then(|c| c.db_name.as_deref())
    }

    /// Collect the conf files of a scanned module and its nested modules.
    pub fn from_scan(module: &ScannedModule, options: &ScanOptions) -> Result<Self> {
        let mut conf = Self::default();
        for (submodule, level) in module.levels() {
            for file in &level.conf_files {
                let extension = if file.name.eq_ignore_ascii_case(&options.env_file) {
                    String::new()
                } else {
                    match file.name.rsplit_once('.') {
                        Some((stem, _)) => stem.to_lowercase(),
                        None => continue,
                    }
                };
                conf.set(&submodule, &extension, ConnectionConf::load(&file.path)?);
            }
        }
        Ok(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(text: &str) -> ConnectionConf {
        ConnectionConf::parse(text).unwrap()
    }

    #[test]
    fn test_parse_env_file() {
        let c = conf(
            "# module defaults\n\
             db_type=mysql\n\
             db_host = 10.0.0.5\n\
             db_port=3307\n\
             db_user=root\n\
             db_pass=secret\n\
             db_name=etracs\n\
             \n\
             app_server=localhost:8070\n\
             unknown=1\n",
        );
        assert_eq!(c.db_type, Some(DbType::Mysql));
        assert_eq!(c.db_host.as_deref(), Some("10.0.0.5"));
        assert_eq!(c.db_port, Some(3307));
        assert_eq!(c.db_name.as_deref(), Some("etracs"));
        assert_eq!(c.app_server.as_deref(), Some("localhost:8070"));
        assert!(c.app_cluster.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(ConnectionConf::parse("db_type=oracle").is_err());
        assert!(ConnectionConf::parse("db_port=abc").is_err());
        assert!(ConnectionConf::parse("just text").is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let c = conf("db_pass=secret");
        let debug = format!("{:?}", c);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_overlay_only_set_values() {
        let mut base = conf("db_type=mysql\ndb_host=a\ndb_name=one");
        base.overlay(&conf("db_host=b"));
        assert_eq!(base.db_host.as_deref(), Some("b"));
        assert_eq!(base.db_name.as_deref(), Some("one"));
        assert_eq!(base.db_type, Some(DbType::Mysql));
    }

    #[test]
    fn test_to_database_config() {
        let db = conf("db_type=mssql\ndb_host=h\ndb_name=d\ndb_user=sa\ndb_port=1500")
            .to_database_config()
            .unwrap();
        assert_eq!(db.r#type, DbType::Mssql);
        assert_eq!(db.effective_port(), 1500);
        assert_eq!(db.user, "sa");
        assert!(conf("db_host=h").to_database_config().is_err());
    }

    #[test]
    fn test_service_endpoint() {
        let c = conf("app_server=localhost:8070\napp_cluster=osiris3\napp_context=etracs25");
        assert_eq!(
            c.service_endpoint().unwrap(),
            "http://localhost:8070/osiris3/json/etracs25"
        );
        assert!(conf("app_server=x").service_endpoint().is_err());
    }

    #[test]
    fn test_resolve_layers() {
        let mut m = ModuleConf::default();
        m.set("", "", conf("db_type=mysql\ndb_host=main\ndb_name=main"));
        m.set("", "sql", conf("db_user=sqluser"));
        m.set("a", "", conf("db_name=a_db"));
        m.set("a.b", "", conf("db_type=mssql"));
        m.set("a.b", "sql", conf("db_host=b_host"));

        let top = m.resolve("", "sql");
        assert_eq!(top.db_host.as_deref(), Some("main"));
        assert_eq!(top.db_user.as_deref(), Some("sqluser"));

        let nested = m.resolve("a.b", "sql");
        assert_eq!(nested.db_type, Some(DbType::Mssql));
        assert_eq!(nested.db_host.as_deref(), Some("b_host"));
        assert_eq!(nested.db_name.as_deref(), Some("a_db"));
        assert_eq!(nested.db_user.as_deref(), Some("sqluser"));

        let svc = m.resolve("a", "svc");
        assert_eq!(svc.db_name.as_deref(), Some("a_db"));
        assert!(svc.db_user.is_none());
    }

    #[test]
    fn test_merge_replaces_same_slot_and_keeps_others() {
        let mut old = ModuleConf::default();
        old.set("", "", conf("db_host=old"));
        old.set("x", "", conf("db_host=gone-from-disk"));

        let mut new = ModuleConf::default();
        new.set("", "", conf("db_host=new"));
        new.set("", "SVC", conf("app_server=s"));

        old.merge(&new);
        assert_eq!(old.get("", "").unwrap().db_host.as_deref(), Some("new"));
        assert_eq!(old.get("x", "").unwrap().db_host.as_deref(), Some("gone-from-disk"));
        assert!(old.get("", "svc").is_some());
        assert_eq!(old.entries().len(), 3);
    }

    #[test]
    fn test_module_conf_json_shape() {
        let mut m = ModuleConf::default();
        m.set("", "", conf("db_type=mysql\ndb_name=x"));
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"submodule": "", "extension": "", "settings": {"db_type": "mysql", "db_name": "x"}}])
        );
        let back: ModuleConf = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.database(), Some("x"));
    }
}
