//! Configuration validation rules.
//!
//! This module provides validation logic for `SyncConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::SyncConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl SyncConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `base_url` is empty
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `retry_attempts` is 0 or exceeds 10
    /// - `page_size` or `search_page_size` is 0 or exceeds 500
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "base_url".into(), reason: "must not be empty".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid { field: "retry_attempts".into(), reason: "must be at least 1".into() });
        }
        if self.retry_attempts > 10 {
            return Err(ConfigError::Invalid { field: "retry_attempts".into(), reason: "must not exceed 10".into() });
        }

        for (field, value) in [("page_size", self.page_size), ("search_page_size", self.search_page_size)] {
            if value == 0 || value > 500 {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must be between 1 and 500".into() });
            }
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.gc_time_ms < self.stale_time_ms {
            tracing::warn!(
                gc_time_ms = self.gc_time_ms,
                stale_time_ms = self.stale_time_ms,
                "gc_time_ms is shorter than stale_time_ms; \
                 unobserved entries are dropped before they go stale"
            );
        }

        Ok(())
    }
}
