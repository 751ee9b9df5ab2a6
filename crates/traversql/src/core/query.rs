//! Keyed SELECT over a catalog table.

use std::sync::Arc;

use super::schema::{PrimaryKey, Table};
use super::value::{KeyPart, SqlValue};

/// `SELECT <all columns> FROM <table> WHERE <key predicate>`.
///
/// Columns outside the natively scannable set, and numeric and timestamp
/// columns, are selected as text so out-of-range values still decode.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub table: Arc<Table>,
    pub filter: PrimaryKey,
}

impl SelectQuery {
    pub fn new(table: Arc<Table>, filter: PrimaryKey) -> Self {
        Self { table, filter }
    }

    /// Rendered SQL text.
    pub fn sql(&self) -> String {
        let select: Vec<String> = self.table.columns.iter().map(|c| c.select_expr()).collect();
        let (predicate, _) = self.filter.where_clause();
        format!(
            "SELECT {} FROM {} WHERE {}",
            select.join(", "),
            self.table.qualified_name(),
            predicate
        )
    }

    /// Bound arguments, in placeholder order.
    pub fn args(&self) -> &[SqlValue] {
        &self.filter.values
    }

    /// Key for the fetch-memoization ledger: query text plus normalised args.
    pub fn ledger_key(&self) -> (String, Vec<KeyPart>) {
        (
            self.sql(),
            self.args().iter().map(SqlValue::key_part).collect(),
        )
    }
}
