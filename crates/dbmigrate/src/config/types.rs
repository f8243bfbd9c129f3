//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::drivers::DbType;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database holding the `dbm_module` and `dbm_migration` tables.
    pub store: DatabaseConfig,

    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Directory scanning behavior.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Service script invocation.
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Connection settings for one MySQL or SQL Server database.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Database type: `mysql` or `mssql`.
    pub r#type: DbType,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306 for MySQL, 1433 for SQL Server).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Maximum pooled connections (MySQL only; SQL Server uses one).
    #[serde(default = "default_connection_limit")]
    pub connection_limit: u32,

    /// Per-statement timeout in seconds (MySQL only).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Require an encrypted connection (SQL Server only).
    #[serde(default)]
    pub encrypt: bool,

    /// Trust the server certificate without validation (SQL Server only).
    #[serde(default = "default_true")]
    pub trust_server_cert: bool,
}

impl DatabaseConfig {
    /// Create a config with default pool and timeout settings.
    pub fn new(
        r#type: DbType,
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            r#type,
            host: host.into(),
            port: None,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            connection_limit: default_connection_limit(),
            timeout_secs: default_timeout_secs(),
            encrypt: false,
            trust_server_cert: true,
        }
    }

    /// Port to connect to, falling back to the engine default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.r#type.default_port())
    }
}

// Custom Debug implementation that redacts password
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("connection_limit", &self.connection_limit)
            .field("timeout_secs", &self.timeout_secs)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root directory holding one subdirectory per module.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Extra directory of schema descriptors (`*.xml`), searched recursively.
    #[serde(default)]
    pub schemas: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            schemas: None,
        }
    }
}

/// Directory scanning behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory name folded into its parent module instead of becoming a submodule.
    #[serde(default = "default_flatten_marker")]
    pub flatten_marker: String,

    /// Extension of connection settings files, excluded from tracking.
    #[serde(default = "default_conf_extension")]
    pub conf_extension: String,

    /// Settings file holding a module level's default connection.
    #[serde(default = "default_env_file")]
    pub env_file: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            flatten_marker: default_flatten_marker(),
            conf_extension: default_conf_extension(),
            env_file: default_env_file(),
        }
    }
}

/// Service script invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP request timeout in seconds.
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_service_timeout(),
        }
    }
}

fn default_connection_limit() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_root() -> PathBuf {
    PathBuf::from("modules")
}

fn default_flatten_marker() -> String {
    "migrations".to_string()
}

fn default_conf_extension() -> String {
    "conf".to_string()
}

fn default_env_file() -> String {
    "env.conf".to_string()
}

fn default_service_timeout() -> u64 {
    30
}
