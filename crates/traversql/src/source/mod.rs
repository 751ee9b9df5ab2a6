//! Relational store access.
//!
//! The traversal engine only talks to a [`SourcePool`]. [`PgSourcePool`] is the
//! PostgreSQL implementation; [`MemorySourcePool`] holds tables in memory for
//! tests and fixtures.

mod memory;
mod postgres;
mod tls;

pub use memory::MemorySourcePool;
pub use postgres::PgSourcePool;
pub use tls::SslMode;

use crate::core::{Column, ForeignKey, SelectQuery, SqlValue, TableRef};
use crate::error::{ExtractError, Result};
use async_trait::async_trait;

/// Trait for source database operations.
#[async_trait]
pub trait SourcePool: Send + Sync {
    /// List base tables in the given schemas, ordered by schema and name.
    async fn list_tables(&self, schemas: &[String]) -> Result<Vec<TableRef>>;

    /// Load column metadata for a table in ordinal order, with primary key flags.
    async fn load_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>>;

    /// List foreign key constraints declared by tables in the given schemas.
    async fn list_foreign_keys(&self, schemas: &[String]) -> Result<Vec<ForeignKey>>;

    /// Whether the column participates in a primary key or unique constraint.
    async fn column_is_unique(&self, schema: &str, table: &str, column: &str) -> Result<bool>;

    /// Run a keyed select and decode every matching row.
    async fn query_rows(&self, query: &SelectQuery) -> Result<Vec<Vec<SqlValue>>>;

    /// Run a keyed select and decode exactly one row.
    async fn query_one(&self, query: &SelectQuery) -> Result<Vec<SqlValue>> {
        self.query_rows(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::RecordNotFound {
                table: query.table.full_name(),
                key: query.filter.to_string(),
            })
    }

    /// Check the store is reachable.
    async fn test_connection(&self) -> Result<()>;

    /// Get the database type.
    fn db_type(&self) -> &str;

    /// Close all connections.
    async fn close(&self);
}
