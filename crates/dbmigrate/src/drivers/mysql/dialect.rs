//! MySQL/MariaDB SQL dialect (Strategy pattern).

use crate::core::identifier::quote_mysql;
use crate::core::traits::{Dialect, SelectQueryOptions};

/// MySQL/MariaDB dialect implementation.
///
/// Positional `?` markers and a trailing `LIMIT [start,]limit` clause.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn limit_clause(&self, opts: &SelectQueryOptions) -> Option<String> {
        let parts: Vec<String> = [opts.start, opts.limit]
            .into_iter()
            .flatten()
            .filter(|n| *n > 0)
            .map(|n| n.to_string())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(format!("LIMIT {}", parts.join(",")))
        }
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mysql(name)
    }

    fn param_marker(&self, _name: &str) -> String {
        "?".to_string()
    }

    fn build_select_query(&self, opts: &SelectQueryOptions) -> String {
        let mut stmt = vec![
            "SELECT".to_string(),
            opts.columns.clone(),
            format!("FROM {}", opts.table),
        ];

        if let Some(ref where_clause) = opts.where_clause {
            stmt.push(format!("WHERE {}", where_clause));
        }
        if let Some(ref order_by) = opts.order_by {
            stmt.push(format!("ORDER BY {}", order_by));
        }
        if let Some(limit) = self.limit_clause(opts) {
            stmt.push(limit);
        }

        stmt.join(" ")
    }
}
