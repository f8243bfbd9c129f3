//! Microsoft SQL Server dialect (Strategy pattern).

use crate::core::identifier::quote_mssql;
use crate::core::traits::{Dialect, SelectQueryOptions};

/// SQL Server dialect implementation.
///
/// Named `@field` markers and `SELECT TOP n`. There is no offset form here:
/// `start` is ignored and only `limit` is rendered.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new SQL Server dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_mssql(name)
    }

    fn param_marker(&self, name: &str) -> String {
        format!("@{}", name)
    }

    fn build_select_query(&self, opts: &SelectQueryOptions) -> String {
        let mut stmt = vec!["SELECT".to_string()];

        if let Some(limit) = opts.limit.filter(|n| *n > 0) {
            stmt.push(format!("TOP {}", limit));
        }

        stmt.push(opts.columns.clone());
        stmt.push(format!("FROM {}", opts.table));

        if let Some(ref where_clause) = opts.where_clause {
            stmt.push(format!("WHERE {}", where_clause));
        }
        if let Some(ref order_by) = opts.order_by {
            stmt.push(format!("ORDER BY {}", order_by));
        }

        stmt.join(" ")
    }
}
