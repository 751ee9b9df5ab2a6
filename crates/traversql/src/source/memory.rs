//! In-memory store for tests and fixtures.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::debug;

use super::SourcePool;
use crate::core::{is_natively_scannable, Column, ForeignKey, SelectQuery, SqlValue, Table, TableRef};
use crate::error::{ExtractError, Result};

struct MemTable {
    table: Table,
    rows: Vec<Vec<SqlValue>>,
}

/// A [`SourcePool`] backed by tables declared in code.
///
/// Keyed selects follow the same rules as PostgreSQL: `NULL` never matches,
/// integer widths compare equal, and columns outside the natively scannable
/// set are compared and returned as text.
///
/// ```rust
/// use traversql::core::{Column, SqlValue, Table};
/// use traversql::source::MemorySourcePool;
///
/// let store = MemorySourcePool::new()
///     .with_table(Table::new("public", "users", vec![Column::new("id", "integer").primary()]))
///     .with_rows("public.users", vec![vec![SqlValue::I32(1)]]);
/// assert_eq!(store.query_count(), 0);
/// ```
#[derive(Default)]
pub struct MemorySourcePool {
    tables: Vec<MemTable>,
    foreign_keys: Vec<ForeignKey>,
    unique: HashSet<(String, String)>,
    queries: AtomicUsize,
}

impl MemorySourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table. Rows are added with [`with_rows`](Self::with_rows).
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(MemTable {
            table,
            rows: Vec::new(),
        });
        self
    }

    /// Append rows to a declared table, values in column order.
    ///
    /// Rows for an undeclared table are ignored.
    pub fn with_rows(mut self, full_name: &str, rows: Vec<Vec<SqlValue>>) -> Self {
        if let Some(t) = self
            .tables
            .iter_mut()
            .find(|t| t.table.full_name() == full_name)
        {
            t.rows.extend(rows);
        }
        self
    }

    /// Declare a foreign key `source(columns) -> target(ref_columns)`, tables
    /// given as `schema.name`.
    pub fn with_foreign_key(
        mut self,
        source: &str,
        columns: &[&str],
        target: &str,
        ref_columns: &[&str],
    ) -> Self {
        let (schema, table) = split_name(source);
        let (ref_schema, ref_table) = split_name(target);
        self.foreign_keys.push(ForeignKey {
            name: format!("{}_{}_fkey", table, columns.join("_")),
            schema: schema.to_string(),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ref_schema: ref_schema.to_string(),
            ref_table: ref_table.to_string(),
            ref_columns: ref_columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Declare a unique constraint on a single column.
    pub fn with_unique(mut self, full_name: &str, column: &str) -> Self {
        self.unique.insert((full_name.to_string(), column.to_string()));
        self
    }

    /// Number of keyed selects executed so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn find(&self, full_name: &str) -> Option<&MemTable> {
        self.tables.iter().find(|t| t.table.full_name() == full_name)
    }
}

fn split_name(full_name: &str) -> (&str, &str) {
    full_name.split_once('.').unwrap_or(("public", full_name))
}

/// SQL equality between a stored value and a bound argument.
fn matches(column: &Column, stored: &SqlValue, arg: &SqlValue) -> bool {
    if stored.is_null() || arg.is_null() {
        return false;
    }
    if is_natively_scannable(&column.data_type) {
        stored.key_part() == arg.key_part()
    } else {
        stored.to_text() == arg.to_text()
    }
}

fn project(column: &Column, value: &SqlValue) -> SqlValue {
    if is_natively_scannable(&column.data_type) {
        value.clone()
    } else {
        value.to_text().map(SqlValue::Text).unwrap_or(SqlValue::Null)
    }
}

#[async_trait]
impl SourcePool for MemorySourcePool {
    async fn list_tables(&self, schemas: &[String]) -> Result<Vec<TableRef>> {
        let mut tables: Vec<TableRef> = self
            .tables
            .iter()
            .filter(|t| schemas.contains(&t.table.schema))
            .map(|t| TableRef::new(&t.table.schema, &t.table.name))
            .collect();
        tables.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
        Ok(tables)
    }

    async fn load_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        let full_name = format!("{}.{}", schema, table);
        self.find(&full_name)
            .map(|t| t.table.columns.clone())
            .ok_or(ExtractError::TableNotFound(full_name))
    }

    async fn list_foreign_keys(&self, schemas: &[String]) -> Result<Vec<ForeignKey>> {
        Ok(self
            .foreign_keys
            .iter()
            .filter(|fk| schemas.contains(&fk.schema))
            .cloned()
            .collect())
    }

    async fn column_is_unique(&self, schema: &str, table: &str, column: &str) -> Result<bool> {
        let full_name = format!("{}.{}", schema, table);
        let primary = self
            .find(&full_name)
            .and_then(|t| t.table.column(column))
            .is_some_and(|c| c.is_primary);
        Ok(primary || self.unique.contains(&(full_name, column.to_string())))
    }

    async fn query_rows(&self, query: &SelectQuery) -> Result<Vec<Vec<SqlValue>>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        debug!("memory query: {} {}", query.sql(), query.filter);

        let full_name = query.table.full_name();
        let stored = self
            .find(&full_name)
            .ok_or_else(|| ExtractError::TableNotFound(full_name.clone()))?;

        let mut filter = Vec::with_capacity(query.filter.columns.len());
        for (col, arg) in query.filter.columns.iter().zip(query.args()) {
            let idx = stored
                .table
                .column_index(&col.name)
                .ok_or_else(|| ExtractError::scan(&full_name, format!("unknown column {}", col.name)))?;
            filter.push((col, idx, arg));
        }

        let mut projection = Vec::with_capacity(query.table.columns.len());
        for col in &query.table.columns {
            let idx = stored
                .table
                .column_index(&col.name)
                .ok_or_else(|| ExtractError::scan(&full_name, format!("unknown column {}", col.name)))?;
            projection.push((col, idx));
        }

        let rows = stored
            .rows
            .iter()
            .filter(|row| {
                filter.iter().all(|(col, idx, arg)| {
                    row.get(*idx).is_some_and(|stored| matches(col, stored, arg))
                })
            })
            .map(|row| {
                projection
                    .iter()
                    .map(|(col, idx)| row.get(*idx).map_or(SqlValue::Null, |v| project(col, v)))
                    .collect()
            })
            .collect();
        Ok(rows)
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}
