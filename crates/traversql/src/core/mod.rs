//! Core data model shared by discovery, traversal and statement generation.
//!
//! - [`schema`]: tables, columns, keys and relationships
//! - [`record`]: fetched rows and their identity
//! - [`query`]: keyed SELECT rendering
//! - [`value`]: column value representation

pub mod query;
pub mod record;
pub mod schema;
pub mod value;

pub use query::SelectQuery;
pub use record::{record_exists, Record, RecordKey};
pub use schema::{
    is_natively_scannable, is_text_decoded, quote_ident, Column, ForeignKey, PrimaryKey,
    RelationType, Relationship, Table, TableRef,
};
pub use value::{KeyPart, SqlValue};
