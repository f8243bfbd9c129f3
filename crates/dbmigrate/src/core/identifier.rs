//! Identifier validation and quoting.
//!
//! Column and table names cannot travel as statement parameters, so every
//! identifier the builder renders goes through one of the quoting functions
//! here. Embedded closing delimiters are doubled, which is how both MySQL and
//! SQL Server escape them inside a quoted identifier.

use crate::error::{MigrateError, Result};

/// Maximum identifier length (SQL Server allows 128, MySQL 64).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate a schema-declared identifier.
///
/// Rejects empty names, names containing null bytes, and names longer than
/// [`MAX_IDENTIFIER_LENGTH`] bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Descriptor(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Descriptor(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Descriptor(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("users"), "`users`");
/// assert_eq!(quote_mysql("table`name"), "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_mssql("users"), "[users]");
/// assert_eq!(quote_mssql("table]name"), "[table]]name]");
/// ```
pub fn quote_mssql(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Whether `c` may start a placeholder or bare identifier.
pub fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

/// Whether `c` may continue a placeholder or bare identifier.
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
