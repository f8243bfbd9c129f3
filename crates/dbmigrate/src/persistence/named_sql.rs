//! Named SQL sets.
//!
//! A `.sql` file is split into `[method]` sections. Inside a section,
//! `$P{name}` tokens stand for parameters:
//!
//! ```sql
//! [getFilteredList]
//! SELECT * FROM entity
//! WHERE state = $P{state} AND name LIKE $P{searchtext}
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::core::schema::FieldType;
use crate::core::traits::{Dialect, Provider};
use crate::core::value::{BoundParam, Entity, Statement};
use crate::error::{MigrateError, Result};

/// Parsed set of named statements.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSql {
    name: String,
    methods: BTreeMap<String, String>,
}

impl NamedSql {
    /// Parse SQL text with `[method]` section headers.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let mut methods = BTreeMap::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for line in text.lines() {
            if let Some(method) = section_header(line) {
                if let Some((method, body)) = current.take() {
                    methods.insert(method, body.join("\n"));
                }
                if methods.contains_key(method) {
                    return Err(MigrateError::Descriptor(format!(
                        "{}: method {} is defined twice",
                        name, method
                    )));
                }
                current = Some((method.to_string(), Vec::new()));
            } else if let Some((_, body)) = current.as_mut() {
                body.push(line);
            }
        }
        if let Some((method, body)) = current {
            methods.insert(method, body.join("\n"));
        }

        Ok(Self { name, methods })
    }

    /// Load `<dir>/<name>.sql`.
    pub fn load(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let path = dir.as_ref().join(format!("{}.sql", name));
        let text = fs::read_to_string(&path).map_err(|e| {
            MigrateError::Config(format!("{}.sql does not exist: {}", name, e))
        })?;
        Self::parse(name, &text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method names in sorted order.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Render a method with parameter values taken from `params`.
    ///
    /// Parameters appear once per token in order of appearance; a token
    /// missing from `params` binds null.
    pub fn render<D: Dialect>(&self, method: &str, params: &Entity, dialect: &D) -> Result<Statement> {
        let raw = self.methods.get(method).ok_or_else(|| {
            MigrateError::Config(format!("{} has no method {}", self.name, method))
        })?;

        let mut sql = String::with_capacity(raw.len());
        let mut values = Vec::new();
        let mut rest = raw.as_str();
        while let Some(start) = rest.find("$P{") {
            let after = &rest[start + 3..];
            let Some(end) = after.find('}') else {
                break;
            };
            let param = after[..end].trim();
            sql.push_str(&rest[..start]);
            sql.push_str(&dialect.param_marker(param));
            let value = params.get(param).cloned().unwrap_or(Value::Null);
            values.push(BoundParam::new(param, value, FieldType::String));
            rest = &after[end + 1..];
        }
        sql.push_str(rest);

        let sql = sql
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Statement::new(sql, values))
    }

    /// Render a method in the provider's dialect and execute it.
    pub async fn execute(
        &self,
        provider: &dyn Provider,
        method: &str,
        params: &Entity,
    ) -> Result<Vec<Entity>> {
        let stmt = self.render(method, params, &provider.dialect())?;
        debug!("{}.{}: {}", self.name, method, stmt.sql);
        provider.execute(&stmt.sql, &stmt.params).await
    }
}

fn section_header(line: &str) -> Option<&str> {
    let inner = line.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
    let mut chars = inner.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(inner)
}
