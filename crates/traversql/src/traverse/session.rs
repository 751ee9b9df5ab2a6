//! Per-extraction state.

use std::collections::HashSet;

use crate::core::{KeyPart, Record, RecordKey, SelectQuery};

/// Direction a relationship was walked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From a record to the row it references.
    Parent,
    /// From a record to rows referencing it.
    Child,
}

/// One walked `(from -> to)` table pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipVisit {
    pub from: String,
    pub to: String,
    pub direction: Direction,
}

/// Ledgers and output owned by a single extraction.
///
/// A session is created for every top-level call and dropped with it, so
/// nothing carries over between extractions on the same engine.
#[derive(Debug, Default)]
pub struct Session {
    fetched: HashSet<(String, Vec<KeyPart>)>,
    visited: HashSet<RecordKey>,
    emitted: HashSet<RecordKey>,
    relationship_visits: Vec<RelationshipVisit>,
    records: Vec<Record>,
    fetches: usize,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fetch in the memoization ledger. Returns false if the same
    /// query text and arguments already ran.
    pub fn record_fetch(&mut self, query: &SelectQuery) -> bool {
        let inserted = self.fetched.insert(query.ledger_key());
        if inserted {
            self.fetches += 1;
        }
        inserted
    }

    /// Mark a record as reached. Returns false if it was reached before.
    pub fn mark_visited(&mut self, record: &Record) -> bool {
        self.visited.insert(record.key())
    }

    pub fn add_relationship_visit(&mut self, from: String, to: String, direction: Direction) {
        self.relationship_visits.push(RelationshipVisit {
            from,
            to,
            direction,
        });
    }

    pub fn has_relationship_visit(&self, from: &str, to: &str, direction: Direction) -> bool {
        self.relationship_visits
            .iter()
            .any(|v| v.from == from && v.to == to && v.direction == direction)
    }

    /// Append a record unless one with the same key is already in the output.
    pub fn emit(&mut self, record: Record) -> bool {
        if !self.emitted.insert(record.key()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn relationship_visits(&self) -> &[RelationshipVisit] {
        &self.relationship_visits
    }

    /// Distinct keyed fetches executed.
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}
