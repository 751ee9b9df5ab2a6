//! Error types for the extraction library.

use thiserror::Error;

/// Main error type for extraction operations.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Catalog discovery returned no tables for the configured schemas.
    #[error("no tables found")]
    NoTablesFound,

    /// Catalog discovery returned no foreign keys between the discovered tables.
    #[error("no relationships found")]
    NoRelationshipsFound,

    /// Table has no primary key and cannot be used as a seed.
    #[error("no primary key found for table {0}")]
    NoPrimaryKey(String),

    /// Table is not part of the discovered catalog.
    #[error("table {0} not found")]
    TableNotFound(String),

    /// The exact fetch (query text and arguments) already ran in this extraction.
    #[error("record already visited in table {table}")]
    RecordAlreadyVisited { table: String },

    /// A keyed lookup matched no row.
    #[error("no record in {table} matching {key}")]
    RecordNotFound { table: String, key: String },

    /// A row could not be decoded into values.
    #[error("failed to scan row from {table}: {message}")]
    Scan { table: String, message: String },

    /// A key value could not be bound to a query parameter.
    #[error("cannot bind parameter {index} as {type_name}: {message}")]
    Bind {
        index: usize,
        type_name: String,
        message: String,
    },

    /// A fetch or child query failed; carries the table and key being resolved.
    #[error("failed to fetch {table} {key}")]
    Fetch {
        table: String,
        key: String,
        #[source]
        source: Box<ExtractError>,
    },

    /// Primary key columns and values differ in length.
    #[error("primary key has {columns} columns but {values} values")]
    InvalidPrimaryKey { columns: usize, values: usize },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Extraction was cancelled (SIGINT, etc.)
    #[error("Extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        ExtractError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Scan error
    pub fn scan(table: impl Into<String>, message: impl ToString) -> Self {
        ExtractError::Scan {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Wrap an error with the table and key that were being fetched.
    ///
    /// Cancellation and already-visited signals pass through unchanged so callers
    /// can still match on them.
    pub fn fetch(self, table: impl Into<String>, key: impl Into<String>) -> Self {
        match self {
            ExtractError::Cancelled | ExtractError::RecordAlreadyVisited { .. } => self,
            other => ExtractError::Fetch {
                table: table.into(),
                key: key.into(),
                source: Box::new(other),
            },
        }
    }

    /// True if this error (or the error it wraps) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ExtractError::Cancelled => true,
            ExtractError::Fetch { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ExtractError::Config(_)
            | ExtractError::Yaml(_)
            | ExtractError::InvalidPrimaryKey { .. } => 2,
            _ if self.is_cancelled() => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_wraps_with_context() {
        let err = ExtractError::scan("public.users", "bad bytes").fetch("public.users", "[id=1]");
        let detailed = err.format_detailed();
        assert!(detailed.contains("failed to fetch public.users [id=1]"));
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("bad bytes"));
    }

    #[test]
    fn test_fetch_passes_through_control_errors() {
        let err = ExtractError::Cancelled.fetch("public.users", "[id=1]");
        assert!(matches!(err, ExtractError::Cancelled));

        let err = ExtractError::RecordAlreadyVisited {
            table: "public.users".into(),
        }
        .fetch("public.users", "[id=1]");
        assert!(matches!(err, ExtractError::RecordAlreadyVisited { .. }));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExtractError::Config("x".into()).exit_code(), 2);
        assert_eq!(
            ExtractError::InvalidPrimaryKey {
                columns: 1,
                values: 2
            }
            .exit_code(),
            2
        );
        assert_eq!(ExtractError::Cancelled.exit_code(), 130);
        assert_eq!(ExtractError::NoTablesFound.exit_code(), 1);
    }
}
