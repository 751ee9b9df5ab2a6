//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database connection.
    pub source: SourceConfig,

    /// Discovery and traversal behavior.
    #[serde(default)]
    pub traversal: TraversalConfig,
}

/// PostgreSQL connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode: disable, require, verify-ca, verify-full (default: disable).
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Which tables are discovered and which directions are walked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalConfig {
    /// Schemas to discover (default: ["public"]).
    #[serde(default = "default_schemas")]
    pub schemas: Vec<String>,

    /// When non-empty, only these tables are discovered.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables never discovered. Wins over `include_tables`.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Resolve the rows each record references (default: true).
    #[serde(default = "default_true")]
    pub follow_parents: bool,

    /// Resolve the rows referencing each record (default: true).
    #[serde(default = "default_true")]
    pub follow_children: bool,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            schemas: default_schemas(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            follow_parents: true,
            follow_children: true,
        }
    }
}

impl TraversalConfig {
    /// Schemas to discover, falling back to `public` when none are set.
    pub fn effective_schemas(&self) -> Vec<String> {
        if self.schemas.is_empty() {
            default_schemas()
        } else {
            self.schemas.clone()
        }
    }

    /// Make sure `schema` is discovered, appending it if missing.
    pub fn ensure_schema(mut self, schema: &str) -> Self {
        if self.schemas.is_empty() {
            self.schemas = default_schemas();
        }
        if !self.schemas.iter().any(|s| s == schema) {
            self.schemas.push(schema.to_string());
        }
        self
    }

    /// Whether a table passes the include/exclude filters.
    ///
    /// Entries match either the bare table name or `schema.name`.
    pub fn allows(&self, schema: &str, name: &str) -> bool {
        let full_name = format!("{}.{}", schema, name);
        let hit = |list: &[String]| list.iter().any(|t| t == name || *t == full_name);
        if hit(&self.exclude_tables) {
            return false;
        }
        self.include_tables.is_empty() || hit(&self.include_tables)
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_schemas() -> Vec<String> {
    vec!["public".to_string()]
}

fn default_true() -> bool {
    true
}
