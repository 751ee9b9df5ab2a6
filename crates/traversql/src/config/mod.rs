//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{ExtractError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from `POSTGRES_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ExtractError::Config(format!("{} is not set", key)))
        };

        let port = match lookup("POSTGRES_PORT").filter(|v| !v.is_empty()) {
            Some(p) => p
                .parse()
                .map_err(|_| ExtractError::Config(format!("POSTGRES_PORT is not a port: {}", p)))?,
            None => 5432,
        };

        let config = Config {
            source: SourceConfig {
                host: required("POSTGRES_HOST")?,
                port,
                database: required("POSTGRES_DB")?,
                user: required("POSTGRES_USER")?,
                password: lookup("POSTGRES_PASSWORD").unwrap_or_default(),
                ssl_mode: lookup("POSTGRES_SSLMODE").unwrap_or_else(|| "disable".to_string()),
                max_connections: 4,
            },
            traversal: TraversalConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl SourceConfig {
    /// libpq-style connection string, password omitted.
    pub fn display_target(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} sslmode={}",
            self.host, self.port, self.database, self.user, self.ssl_mode
        )
    }
}
