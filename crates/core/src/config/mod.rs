//! Engine configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SYNQ_*)
//! 2. TOML config file (if SYNQ_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::FetchOptions;

mod validation;

pub use validation::ConfigError;

/// Engine configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SYNQ_*)
/// 2. TOML config file (if SYNQ_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the REST data source.
    ///
    /// Set via SYNQ_BASE_URL environment variable.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via SYNQ_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-attempt fetch timeout in milliseconds.
    ///
    /// Set via SYNQ_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Total attempts for a retryable fetch failure.
    ///
    /// Set via SYNQ_RETRY_ATTEMPTS environment variable.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay before the first retry; doubles on every further attempt.
    ///
    /// Set via SYNQ_RETRY_BASE_DELAY_MS environment variable.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Age after which cached data is served stale and refetched.
    ///
    /// Set via SYNQ_STALE_TIME_MS environment variable.
    #[serde(default = "default_stale_time_ms")]
    pub stale_time_ms: u64,

    /// Grace period before an unsubscribed entry is dropped.
    ///
    /// Set via SYNQ_GC_TIME_MS environment variable.
    #[serde(default = "default_gc_time_ms")]
    pub gc_time_ms: u64,

    /// Items per page for collections.
    ///
    /// Set via SYNQ_PAGE_SIZE environment variable.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum typeahead results.
    ///
    /// Set via SYNQ_SEARCH_PAGE_SIZE environment variable.
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,

    /// Typeahead debounce delay in milliseconds.
    ///
    /// Set via SYNQ_DEBOUNCE_MS environment variable.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Path to the SQLite preference store.
    ///
    /// Set via SYNQ_PREFS_PATH environment variable.
    #[serde(default = "default_prefs_path")]
    pub prefs_path: PathBuf,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".into()
}

fn default_user_agent() -> String {
    "synq/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_stale_time_ms() -> u64 {
    30_000
}

fn default_gc_time_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_page_size() -> u32 {
    12
}

fn default_search_page_size() -> u32 {
    10
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_prefs_path() -> PathBuf {
    PathBuf::from("./synq-prefs.sqlite")
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            stale_time_ms: default_stale_time_ms(),
            gc_time_ms: default_gc_time_ms(),
            page_size: default_page_size(),
            search_page_size: default_search_page_size(),
            debounce_ms: default_debounce_ms(),
            prefs_path: default_prefs_path(),
        }
    }
}

impl SyncConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }

    /// Default per-fetch options derived from this configuration.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: self.timeout(),
            attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            stale_time: Duration::from_millis(self.stale_time_ms),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SYNQ_`
    /// 2. TOML file from `SYNQ_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SYNQ_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SYNQ_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
