//! # traversql
//!
//! Extract a referentially complete slice of a PostgreSQL database.
//!
//! Starting from one seed row, the extractor walks foreign keys in both
//! directions and renders every reached row as an `INSERT` statement, ordered
//! so that referenced rows come before the rows that point at them.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use traversql::{Config, Extractor, PgSourcePool, SqlValue};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> traversql::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let source = Arc::new(PgSourcePool::new(&config.source).await?);
//!     let extractor = Extractor::discover(source, &config.traversal).await?;
//!     let (table, key) = extractor
//!         .seed_key("public", "orders", &["id".to_string()], vec![SqlValue::I64(1)])
//!         .await?;
//!     let sql = extractor
//!         .extract_graph(&table, key, &CancellationToken::new())
//!         .await?;
//!     print!("{}", sql);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod insert;
pub mod source;
pub mod traverse;

pub use catalog::Catalog;
pub use config::{Config, SourceConfig, TraversalConfig};
pub use core::{
    Column, ForeignKey, KeyPart, PrimaryKey, Record, RecordKey, RelationType, Relationship,
    SelectQuery, SqlValue, Table, TableRef,
};
pub use error::{ExtractError, Result};
pub use insert::{generate_insert_statements, sql_value_to_literal};
pub use source::{MemorySourcePool, PgSourcePool, SourcePool};
pub use traverse::{ExtractionSummary, Extractor, Session};
