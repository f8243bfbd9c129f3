//! Error types for the migration library.

use thiserror::Error;

/// Exit code for a successful run.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for configuration and descriptor problems.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connection failures.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for failed statements or service calls.
pub const EXIT_EXECUTION_ERROR: u8 = 3;
/// Exit code for entity validation failures.
pub const EXIT_VALIDATION_ERROR: u8 = 4;
/// Exit code for lookups of modules or schemas that do not exist.
pub const EXIT_NOT_FOUND: u8 = 5;
/// Exit code for filesystem errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for schema, builder and migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A schema descriptor could not be parsed.
    #[error("Schema descriptor error: {0}")]
    Descriptor(String),

    /// Requested schema name is not registered.
    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    /// Entity failed field serialization (required field missing, bad number).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No handler accepts the file's extension and dialect.
    #[error("No handler found for file {file}")]
    HandlerNotFound { file: String },

    /// A statement inside a migration file failed.
    #[error("Statement failed in {file}: {message}")]
    StatementExecution { file: String, message: String },

    /// A service script call failed.
    #[error("Service invocation failed: {0}")]
    ServiceInvocation(String),

    /// Connection or pool error with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Statement exceeded the provider timeout.
    #[error("Statement timed out after {0}s")]
    Timeout(u64),

    /// No registered module has the given id.
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// MySQL driver error
    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql_async::Error),

    /// SQL Server driver error
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a StatementExecution error
    pub fn statement(file: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::StatementExecution {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Descriptor(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connection { .. }
            | MigrateError::Timeout(_)
            | MigrateError::Mysql(_)
            | MigrateError::Mssql(_) => EXIT_CONNECTION_ERROR,
            MigrateError::StatementExecution { .. }
            | MigrateError::ServiceInvocation(_)
            | MigrateError::HandlerNotFound { .. }
            | MigrateError::Http(_) => EXIT_EXECUTION_ERROR,
            MigrateError::Validation(_) | MigrateError::Json(_) => EXIT_VALIDATION_ERROR,
            MigrateError::UnknownSchema(_) | MigrateError::ModuleNotFound(_) => EXIT_NOT_FOUND,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::connection("refused", "connecting").exit_code(),
            EXIT_CONNECTION_ERROR
        );
        assert_eq!(
            MigrateError::statement("a.sql", "syntax").exit_code(),
            EXIT_EXECUTION_ERROR
        );
        assert_eq!(
            MigrateError::Validation("x".into()).exit_code(),
            EXIT_VALIDATION_ERROR
        );
        assert_eq!(
            MigrateError::ModuleNotFound("m".into()).exit_code(),
            EXIT_NOT_FOUND
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err = MigrateError::from(io);
        let text = err.format_detailed();
        assert!(text.starts_with("Error: IO error: missing file"));
    }
}
