//! Entity schema metadata.
//!
//! A [`Schema`] describes one persisted entity: its name, backing table and
//! the ordered list of [`Field`]s. Schemas are built once by the
//! [`SchemaRegistry`](crate::schema::SchemaRegistry) and shared behind `Arc`;
//! there is no way to alter a schema after construction.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::identifier::validate_identifier;
use crate::error::{MigrateError, Result};

/// Declared type of a field. Drives value serialization and typed binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    Json,
}

impl FieldType {
    /// Lowercase type name as written in descriptors.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Json => "json",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "string" | "" => Ok(FieldType::String),
            "integer" | "int" => Ok(FieldType::Integer),
            "decimal" => Ok(FieldType::Decimal),
            "boolean" => Ok(FieldType::Boolean),
            "date" => Ok(FieldType::Date),
            "json" => Ok(FieldType::Json),
            other => Err(MigrateError::Descriptor(format!(
                "unsupported field type '{}'",
                other
            ))),
        }
    }
}

/// One field of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub primary: bool,
    pub required: bool,
}

impl Field {
    /// Create an optional, non-key field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            primary: false,
            required: false,
        }
    }

    /// Mark the field as part of the primary key.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Mark the field as required on write.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Immutable description of one persisted entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    table_name: String,
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting invalid or duplicate field names.
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        fields: Vec<Field>,
    ) -> Result<Self> {
        let name = name.into();
        let table_name = table_name.into();
        validate_identifier(&name)?;
        validate_identifier(&table_name)?;

        if fields.is_empty() {
            return Err(MigrateError::Descriptor(format!(
                "schema {} declares no fields",
                name
            )));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            validate_identifier(&field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(MigrateError::Descriptor(format!(
                    "schema {} declares field {} twice",
                    name, field.name
                )));
            }
        }

        Ok(Self {
            name,
            table_name,
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by exact name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Primary key fields in declaration order.
    pub fn primary_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_from_str() {
        assert_eq!("Integer".parse::<FieldType>().unwrap(), FieldType::Integer);
        assert_eq!("".parse::<FieldType>().unwrap(), FieldType::String);
        assert_eq!("json".parse::<FieldType>().unwrap(), FieldType::Json);
        assert!("blob".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::new(
            "entity",
            "entity",
            vec![
                Field::new("objid", FieldType::String).primary(),
                Field::new("age", FieldType::Integer),
            ],
        )
        .unwrap();

        assert_eq!(schema.field("age").unwrap().field_type, FieldType::Integer);
        assert!(schema.field("missing").is_none());
        let pks: Vec<_> = schema.primary_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(pks, vec!["objid"]);
    }

    #[test]
    fn test_schema_rejects_duplicate_fields() {
        let result = Schema::new(
            "entity",
            "entity",
            vec![
                Field::new("objid", FieldType::String),
                Field::new("objid", FieldType::Integer),
            ],
        );
        assert!(matches!(result, Err(MigrateError::Descriptor(_))));
    }

    #[test]
    fn test_schema_rejects_empty_field_list() {
        assert!(Schema::new("entity", "entity", vec![]).is_err());
    }
}
