//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::DbType;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let yaml = r#"
store:
  type: mysql
  host: localhost
  database: dbm
  user: root
  password: secret
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.store.r#type, DbType::Mysql);
        assert_eq!(config.store.effective_port(), 3306);
        assert_eq!(config.store.connection_limit, 10);
        assert_eq!(config.store.timeout_secs, 60);
        assert_eq!(config.paths.root, std::path::PathBuf::from("modules"));
        assert_eq!(config.scan.flatten_marker, "migrations");
        assert_eq!(config.scan.conf_extension, "conf");
        assert_eq!(config.scan.env_file, "env.conf");
        assert_eq!(config.service.timeout_secs, 30);
    }

    #[test]
    fn test_from_yaml_mssql_store() {
        let yaml = r#"
store:
  type: mssql
  host: db.internal
  port: 14330
  database: dbm
  user: sa
paths:
  root: /srv/modules
  schemas: /srv/schemas
scan:
  flatten_marker: scripts
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.store.r#type, DbType::Mssql);
        assert_eq!(config.store.effective_port(), 14330);
        assert_eq!(config.scan.flatten_marker, "scripts");
        assert_eq!(config.scan.conf_extension, "conf");
        assert!(config.paths.schemas.is_some());
    }

    #[test]
    fn test_from_yaml_rejects_unknown_db_type() {
        let yaml = r#"
store:
  type: oracle
  host: localhost
  database: dbm
  user: root
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/dbmigrate.yaml").unwrap_err();
        assert!(matches!(err, crate::MigrateError::Io(_)));
    }
}
