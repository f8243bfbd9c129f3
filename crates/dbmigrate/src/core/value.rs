//! Entity values, bound parameters and rendered statements.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::FieldType;
use crate::error::{MigrateError, Result};

/// A row or record: field name to JSON value, in insertion order.
pub type Entity = serde_json::Map<String, Value>;

/// One statement parameter.
///
/// `value` is already serialized for write statements and raw for filter
/// bindings. `field_type` selects the typed bind on drivers that need one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundParam {
    pub field: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl BoundParam {
    pub fn new(field: impl Into<String>, value: Value, field_type: FieldType) -> Self {
        Self {
            field: field.into(),
            value,
            field_type,
        }
    }
}

/// Statement text plus its parameters in marker order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<BoundParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<BoundParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Convert a serializable record into an entity map.
pub fn to_entity<T: Serialize>(record: &T) -> Result<Entity> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(MigrateError::Validation(format!(
            "expected a record, got {}",
            other
        ))),
    }
}

/// Convert an entity map back into a typed record.
pub fn from_entity<T: DeserializeOwned>(entity: Entity) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(entity))?)
}

/// Serde adapter for `NaiveDateTime` in SQL text form (`YYYY-MM-DD HH:MM:SS`).
pub mod sql_datetime {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(serde::de::Error::custom)
    }

    /// Parse SQL or ISO text, ignoring fractional seconds.
    pub fn parse(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        let text = text.trim();
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
    }
}
