//! Per-type value serialization for writes and deserialization for reads.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};

use crate::core::schema::{Field, FieldType, Schema};
use crate::core::value::{sql_datetime, Entity};
use crate::error::{MigrateError, Result};

/// Serialize one value for a write statement.
///
/// Fails with a validation error when a required field is null or absent,
/// or when a numeric or date value cannot be parsed.
pub fn serialize_value(field: &Field, value: Option<&Value>) -> Result<Value> {
    let value = match value {
        None | Some(Value::Null) => {
            if field.required {
                return Err(MigrateError::Validation(format!(
                    "{} must be specified.",
                    field.name
                )));
            }
            return Ok(Value::Null);
        }
        Some(v) => v,
    };

    if field.field_type != FieldType::String && is_blank(value) {
        if field.required {
            return Err(MigrateError::Validation(format!(
                "{} must be specified.",
                field.name
            )));
        }
        return Ok(Value::Null);
    }

    match field.field_type {
        FieldType::String => Ok(value.clone()),
        FieldType::Boolean => Ok(Value::from(if is_truthy(value) { 1 } else { 0 })),
        FieldType::Integer => parse_integer(value)
            .map(Value::from)
            .ok_or_else(|| invalid(field, "integer")),
        FieldType::Decimal => parse_decimal(value)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid(field, "decimal")),
        FieldType::Date => parse_date(value)
            .map(|dt| Value::String(dt.format(sql_datetime::FORMAT).to_string()))
            .ok_or_else(|| invalid(field, "date")),
        FieldType::Json => Ok(Value::String(serde_json::to_string(value)?)),
    }
}

/// Apply read-side conversions for boolean and json fields.
pub fn deserialize_value(field: &Field, value: Value) -> Result<Value> {
    match (field.field_type, value) {
        (_, Value::Null) => Ok(Value::Null),
        (FieldType::Boolean, value) => Ok(Value::Bool(is_truthy(&value))),
        (FieldType::Json, Value::String(text)) => serde_json::from_str(&text).map_err(|e| {
            MigrateError::Validation(format!("{} holds invalid json: {}", field.name, e))
        }),
        (_, value) => Ok(value),
    }
}

/// Deserialize a row through the schema, dropping columns it does not declare.
pub fn deserialize_row(schema: &Schema, row: Entity) -> Result<Entity> {
    let mut entity = Entity::new();
    for (name, value) in row {
        if let Some(field) = schema.field(&name) {
            let value = deserialize_value(field, value)?;
            entity.insert(name, value);
        }
    }
    Ok(entity)
}

fn invalid(field: &Field, kind: &str) -> MigrateError {
    MigrateError::Validation(format!("{} is an invalid {}.", field.name, kind))
}

fn is_blank(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.trim().is_empty())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "yes" | "y" | "t" | "true"
        ),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    }
}

fn parse_decimal(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc).naive_utc())
                .ok()
                .or_else(|| sql_datetime::parse(s).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
        }
        // Epoch milliseconds
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.naive_utc()),
        _ => None,
    }
}
