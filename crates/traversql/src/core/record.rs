//! Fetched rows and their identity.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::schema::{Column, Table};
use super::value::{KeyPart, SqlValue};

/// One row of a table, values aligned with `columns`.
#[derive(Debug, Clone)]
pub struct Record {
    pub table: Arc<Table>,
    pub columns: Vec<Column>,
    pub values: Vec<SqlValue>,
}

impl Record {
    pub fn new(table: Arc<Table>, columns: Vec<Column>, values: Vec<SqlValue>) -> Self {
        Self {
            table,
            columns,
            values,
        }
    }

    /// Value of the named column, if present.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .and_then(|i| self.values.get(i))
    }

    /// Structural equality over named column/value pairs.
    ///
    /// Column order does not matter; two records of the same table with the
    /// same pairs are equal.
    pub fn equal(&self, other: &Record) -> bool {
        if self.table.full_name() != other.table.full_name()
            || self.columns.len() != other.columns.len()
            || self.values.len() != other.values.len()
        {
            return false;
        }

        let mine: HashMap<&str, &SqlValue> = self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(&self.values)
            .collect();
        let theirs: HashMap<&str, &SqlValue> = other
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .zip(&other.values)
            .collect();

        mine.len() == theirs.len()
            && mine
                .iter()
                .all(|(name, v)| theirs.get(name).is_some_and(|o| v.same_as(o)))
    }

    /// Identity used for deduplication: primary column values, or every
    /// column when the table has no primary key.
    pub fn key(&self) -> RecordKey {
        let has_pk = self.columns.iter().any(|c| c.is_primary);
        let parts = self
            .columns
            .iter()
            .zip(&self.values)
            .filter(|(c, _)| !has_pk || c.is_primary)
            .map(|(_, v)| v.key_part())
            .collect();
        RecordKey {
            table: self.table.full_name(),
            parts,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.table.full_name(), self.key())
    }
}

/// `(table, primary key tuple)` identity of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub table: String,
    pub parts: Vec<KeyPart>,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.parts.iter().map(ToString::to_string).collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// True if `records` already holds a row of the same table with equal
/// primary column values.
pub fn record_exists(records: &[Record], candidate: &Record) -> bool {
    let key = candidate.key();
    records.iter().any(|r| r.key() == key)
}
