//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_database("store", &config.store)?;

    if config.paths.root.as_os_str().is_empty() {
        return Err(MigrateError::Config("paths.root is required".into()));
    }

    if config.scan.flatten_marker.trim().is_empty() {
        return Err(MigrateError::Config(
            "scan.flatten_marker cannot be empty".into(),
        ));
    }
    if config.scan.conf_extension.trim().is_empty() || config.scan.conf_extension.contains('.') {
        return Err(MigrateError::Config(format!(
            "scan.conf_extension must be a bare extension, got '{}'",
            config.scan.conf_extension
        )));
    }
    if config.scan.env_file.trim().is_empty() {
        return Err(MigrateError::Config("scan.env_file cannot be empty".into()));
    }

    if config.service.timeout_secs == 0 {
        return Err(MigrateError::Config(
            "service.timeout_secs must be at least 1".into(),
        ));
    }

    Ok(())
}

/// Validate one set of connection settings. `prefix` names the section in messages.
pub fn validate_database(prefix: &str, db: &DatabaseConfig) -> Result<()> {
    if db.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", prefix)));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config(format!(
            "{}.database is required",
            prefix
        )));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", prefix)));
    }
    if let Some(0) = db.port {
        return Err(MigrateError::Config(format!(
            "{}.port must be greater than 0",
            prefix
        )));
    }
    if db.connection_limit == 0 {
        return Err(MigrateError::Config(format!(
            "{}.connection_limit must be at least 1",
            prefix
        )));
    }
    if db.timeout_secs == 0 {
        return Err(MigrateError::Config(format!(
            "{}.timeout_secs must be at least 1",
            prefix
        )));
    }
    Ok(())
}
