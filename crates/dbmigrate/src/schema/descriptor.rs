//! XML schema descriptor parsing.
//!
//! ```xml
//! <schema>
//!   <element name="entity" tablename="entity">
//!     <field name="objid" primary="true"/>
//!     <field name="age" type="integer"/>
//!   </element>
//! </schema>
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::core::schema::{Field, FieldType, Schema};
use crate::error::{MigrateError, Result};

/// Parse one descriptor document.
///
/// `fallback_name` (normally the file stem) names the schema when the
/// element carries no `name` attribute.
pub fn parse_descriptor(fallback_name: &str, xml: &str) -> Result<Schema> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut element: Option<(String, String)> = None;
    let mut fields = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            MigrateError::Descriptor(format!(
                "{}: malformed xml at byte {}: {}",
                fallback_name,
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(tag) | Event::Empty(tag) => match tag.name().as_ref() {
                b"element" => {
                    if element.is_some() {
                        return Err(MigrateError::Descriptor(format!(
                            "{}: more than one element declared",
                            fallback_name
                        )));
                    }
                    let attrs = attributes(fallback_name, &tag)?;
                    let name = lookup(&attrs, "name").unwrap_or(fallback_name).to_string();
                    let table = lookup(&attrs, "tablename").unwrap_or(&name).to_string();
                    element = Some((name, table));
                }
                b"field" => {
                    if element.is_none() {
                        return Err(MigrateError::Descriptor(format!(
                            "{}: field declared outside element",
                            fallback_name
                        )));
                    }
                    fields.push(parse_field(fallback_name, &tag)?);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let (name, table) = element.ok_or_else(|| {
        MigrateError::Descriptor(format!("{}: no element declared", fallback_name))
    })?;
    Schema::new(name, table, fields)
}

fn parse_field(source: &str, tag: &BytesStart<'_>) -> Result<Field> {
    let attrs = attributes(source, tag)?;
    let name = lookup(&attrs, "name").ok_or_else(|| {
        MigrateError::Descriptor(format!("{}: field without a name", source))
    })?;
    let field_type = match lookup(&attrs, "type") {
        Some(t) => t.parse::<FieldType>().map_err(|e| {
            MigrateError::Descriptor(format!("{}: field {}: {}", source, name, e))
        })?,
        None => FieldType::String,
    };

    let mut field = Field::new(name, field_type);
    field.primary = lookup(&attrs, "primary").is_some_and(is_true);
    field.required = lookup(&attrs, "required").is_some_and(is_true);
    Ok(field)
}

fn attributes(source: &str, tag: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    tag.attributes()
        .map(|attr| {
            let attr = attr.map_err(|e| {
                MigrateError::Descriptor(format!("{}: bad attribute: {}", source, e))
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
            let value = attr
                .unescape_value()
                .map_err(|e| MigrateError::Descriptor(format!("{}: {}", source, e)))?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn lookup<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn is_true(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "t" | "true" | "y" | "yes" | "1"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTITY: &str = r#"
        <schema>
            <element tablename="entity">
                <field name="objid" primary="true" required="Y"/>
                <field name="state"/>
                <field name="name" type="string"/>
                <field name="age" type="integer"/>
                <field name="salary" type="decimal"/>
                <field name="birthdate" type="date"/>
            </element>
        </schema>
    "#;

    #[test]
    fn test_parse_entity_descriptor() {
        let schema = parse_descriptor("entity", ENTITY).unwrap();
        assert_eq!(schema.name(), "entity");
        assert_eq!(schema.table_name(), "entity");
        assert_eq!(schema.fields().len(), 6);

        let objid = schema.field("objid").unwrap();
        assert!(objid.primary);
        assert!(objid.required);
        assert_eq!(schema.field("state").unwrap().field_type, FieldType::String);
        assert_eq!(schema.field("age").unwrap().field_type, FieldType::Integer);
        assert!(!schema.field("age").unwrap().primary);
    }

    #[test]
    fn test_name_attribute_overrides_file_stem() {
        let xml = r#"<schema><element name="app" tablename="sys_app">
            <field name="objid" primary="1"/><field name="title"/>
        </element></schema>"#;
        let schema = parse_descriptor("ignored", xml).unwrap();
        assert_eq!(schema.name(), "app");
        assert_eq!(schema.table_name(), "sys_app");
    }

    #[test]
    fn test_table_defaults_to_name() {
        let xml = r#"<schema><element><field name="a"/></element></schema>"#;
        assert_eq!(parse_descriptor("thing", xml).unwrap().table_name(), "thing");
    }

    #[test]
    fn test_boolean_attribute_forms() {
        for v in ["t", "TRUE", "y", "Yes", "1"] {
            assert!(is_true(v), "{v}");
        }
        for v in ["0", "no", "false", "", "truthy"] {
            assert!(!is_true(v), "{v}");
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let xml = r#"<schema><element><field name="a" type="blob"/></element></schema>"#;
        let err = parse_descriptor("thing", xml).unwrap_err();
        assert!(matches!(err, MigrateError::Descriptor(_)));
    }

    #[test]
    fn test_missing_element_rejected() {
        assert!(parse_descriptor("thing", "<schema/>").is_err());
        assert!(parse_descriptor("thing", "<schema><element>").is_err());
    }
}
