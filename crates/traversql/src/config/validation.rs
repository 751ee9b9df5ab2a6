//! Configuration validation.

use super::Config;
use crate::error::{ExtractError, Result};
use crate::source::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.source.host.is_empty() {
        return Err(ExtractError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(ExtractError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(ExtractError::Config("source.user is required".into()));
    }
    if config.source.max_connections == 0 {
        return Err(ExtractError::Config(
            "source.max_connections must be at least 1".into(),
        ));
    }
    SslMode::parse(&config.source.ssl_mode)?;

    if config.traversal.schemas.iter().any(|s| s.trim().is_empty()) {
        return Err(ExtractError::Config(
            "traversal.schemas must not contain empty names".into(),
        ));
    }
    if !config.traversal.follow_parents && !config.traversal.follow_children {
        tracing::warn!("follow_parents and follow_children are both off; only the seed row is extracted");
    }

    Ok(())
}
