//! Filter translation.
//!
//! A filter is normalized to clause text, identifiers known to the schema
//! are wrapped in the dialect's delimiters, and `:name` placeholders are
//! replaced by dialect markers. Each placeholder yields one [`BoundParam`]
//! when the filter carries a bound object.

use serde_json::Value;

use crate::core::identifier::{is_ident_char, is_ident_start};
use crate::core::schema::{FieldType, Schema};
use crate::core::traits::Dialect;
use crate::core::value::{BoundParam, Entity};

/// Row filter for select, update and delete statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field/value pairs ANDed together as equalities.
    Fields(Entity),
    /// Explicit clause, optionally with values for its `:name` placeholders.
    Clause {
        clause: String,
        bindings: Option<Entity>,
    },
}

impl Filter {
    /// Literal clause with no bound values.
    pub fn clause(clause: impl Into<String>) -> Self {
        Filter::Clause {
            clause: clause.into(),
            bindings: None,
        }
    }

    /// Clause whose `:name` placeholders take values from `bindings`.
    pub fn bound(clause: impl Into<String>, bindings: Entity) -> Self {
        Filter::Clause {
            clause: clause.into(),
            bindings: Some(bindings),
        }
    }

    /// Normalize into clause text plus optional bindings.
    fn into_clause(self) -> (String, Option<Entity>) {
        match self {
            Filter::Fields(fields) => {
                let clause = fields
                    .keys()
                    .map(|k| format!("{}=:{}", k, k))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                (clause, Some(fields))
            }
            Filter::Clause { clause, bindings } => (clause, bindings),
        }
    }
}

/// Render a filter into `WHERE` body text and its parameters.
///
/// Returns `None` for an empty clause.
pub(crate) fn render_filter<D: Dialect>(
    filter: Filter,
    schema: &Schema,
    dialect: &D,
) -> Option<(String, Vec<BoundParam>)> {
    let (clause, bindings) = filter.into_clause();
    if clause.trim().is_empty() {
        return None;
    }

    let delimited = delimit_fields(&clause, schema, dialect);
    let (sql, names) = replace_placeholders(&delimited, dialect);

    let params = match bindings {
        Some(bindings) => names
            .into_iter()
            .map(|name| {
                let value = bindings.get(&name).cloned().unwrap_or(Value::Null);
                let field_type = schema
                    .field(&name)
                    .map(|f| f.field_type)
                    .unwrap_or(FieldType::String);
                BoundParam::new(name, value, field_type)
            })
            .collect(),
        None => Vec::new(),
    };

    Some((sql, params))
}

/// Wrap field references in identifier delimiters.
///
/// Tokens are split on single spaces. A token of the form
/// `identifier<op>rest` (where `<op>` is a run of `=<>!`) has its identifier
/// delimited; a bare token naming a schema field is delimited whole.
fn delimit_fields<D: Dialect>(clause: &str, schema: &Schema, dialect: &D) -> String {
    clause
        .split(' ')
        .map(|token| {
            if let Some((ident, rest)) = split_comparison(token) {
                format!("{}{}", dialect.quote_ident(ident), rest)
            } else if schema.field(token).is_some() {
                dialect.quote_ident(token)
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split `ident<op>value` into `(ident, "<op>value")`.
fn split_comparison(token: &str) -> Option<(&str, &str)> {
    let op_start = token.find(|c: char| matches!(c, '=' | '<' | '>' | '!'))?;
    let (ident, rest) = token.split_at(op_start);

    let mut ident_chars = ident.chars();
    let starts_ok = ident_chars.next().is_some_and(is_ident_start);
    if !starts_ok || !ident_chars.all(is_ident_char) {
        return None;
    }

    let value = rest.trim_start_matches(|c: char| matches!(c, '=' | '<' | '>' | '!'));
    let op = &rest[..rest.len() - value.len()];
    if value.is_empty() || !matches!(op, "=" | "<" | ">" | "<=" | ">=" | "<>" | "!=") {
        return None;
    }

    Some((ident, rest))
}

/// Replace `:name` placeholders outside quoted literals with dialect markers.
///
/// Returns the rewritten text and the placeholder names in order. `::` is
/// left alone.
fn replace_placeholders<D: Dialect>(clause: &str, dialect: &D) -> (String, Vec<String>) {
    let mut out = String::with_capacity(clause.len());
    let mut names = Vec::new();
    let mut chars = clause.chars().peekable();
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            out.push(c);
            prev = Some(c);
            continue;
        }

        if c == '\'' || c == '"' {
            quote = Some(c);
            out.push(c);
        } else if c == ':'
            && prev != Some(':')
            && chars.peek().copied().is_some_and(is_ident_start)
        {
            let mut name = String::new();
            while let Some(&next) = chars.peek() {
                if !is_ident_char(next) {
                    break;
                }
                name.push(next);
                chars.next();
            }
            out.push_str(&dialect.param_marker(&name));
            names.push(name);
            prev = Some('_');
            continue;
        } else {
            out.push(c);
        }
        prev = Some(c);
    }

    (out, names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::Field;
    use crate::drivers::{MssqlDialect, MysqlDialect};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(
            "entity",
            "entity",
            vec![
                Field::new("objid", FieldType::String).primary(),
                Field::new("state", FieldType::String),
                Field::new("age", FieldType::Integer),
            ],
        )
        .unwrap()
    }

    fn entity(v: Value) -> Entity {
        match v {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_fields_filter_normalizes_to_anded_equalities() {
        let filter = Filter::Fields(entity(json!({"state": "DRAFT", "age": 10})));
        let (sql, params) = render_filter(filter, &schema(), &MysqlDialect::new()).unwrap();
        assert_eq!(sql, "`state`=? AND `age`=?");
        assert_eq!(
            params,
            vec![
                BoundParam::new("state", json!("DRAFT"), FieldType::String),
                BoundParam::new("age", json!(10), FieldType::Integer),
            ]
        );
    }

    #[test]
    fn test_literal_clause_delimits_identifiers_only() {
        let filter = Filter::clause("state = 'DRAFT' OR age > 50");
        let (sql, params) = render_filter(filter, &schema(), &MssqlDialect::new()).unwrap();
        assert_eq!(sql, "[state] = 'DRAFT' OR [age] > 50");
        assert!(params.is_empty());
    }

    #[test]
    fn test_compact_comparison_tokens() {
        let filter = Filter::clause("state='DRAFT' AND age>=18");
        let (sql, _) = render_filter(filter, &schema(), &MssqlDialect::new()).unwrap();
        assert_eq!(sql, "[state]='DRAFT' AND [age]>=18");
    }

    #[test]
    fn test_unknown_placeholder_binds_null_string() {
        let filter = Filter::bound("state = :state OR code = :code", entity(json!({"state": "A"})));
        let (sql, params) = render_filter(filter, &schema(), &MssqlDialect::new()).unwrap();
        assert_eq!(sql, "[state] = @state OR code = @code");
        assert_eq!(params[1], BoundParam::new("code", json!(null), FieldType::String));
    }

    #[test]
    fn test_placeholders_inside_literals_ignored() {
        let filter = Filter::bound("state = ':state' AND age = :age", entity(json!({"age": 3})));
        let (sql, params) = render_filter(filter, &schema(), &MysqlDialect::new()).unwrap();
        assert_eq!(sql, "`state` = ':state' AND `age` = ?");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_clause_without_bindings_yields_no_params() {
        let filter = Filter::clause("state = :state");
        let (sql, params) = render_filter(filter, &schema(), &MysqlDialect::new()).unwrap();
        assert_eq!(sql, "`state` = ?");
        assert!(params.is_empty());
    }

    #[test]
    fn test_empty_clause_renders_nothing() {
        assert!(render_filter(Filter::clause("  "), &schema(), &MysqlDialect::new()).is_none());
        assert!(render_filter(Filter::Fields(Entity::new()), &schema(), &MysqlDialect::new()).is_none());
    }

    #[test]
    fn test_split_comparison() {
        assert_eq!(split_comparison("a=b"), Some(("a", "=b")));
        assert_eq!(split_comparison("a<>b"), Some(("a", "<>b")));
        assert_eq!(split_comparison("a!=b"), Some(("a", "!=b")));
        assert_eq!(split_comparison("'x=y'"), None);
        assert_eq!(split_comparison("a="), None);
        assert_eq!(split_comparison("="), None);
    }
}
