//! Unified error types for synq.
//!
//! Fetch-level errors are attached to cache entries and shared between every
//! waiter of a coalesced fetch, so the type is `Clone` and carries its
//! payloads as strings.

use tokio_rusqlite::rusqlite;

/// Unified error type for the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Transport failure (connection refused, reset, DNS, ...).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch exceeded its deadline.
    #[error("TIMEOUT: fetch exceeded {0}ms")]
    Timeout(u64),

    /// Non-2xx response.
    #[error("HTTP_ERROR: status {status}")]
    Http { status: u16 },

    /// Malformed or unexpected response shape.
    #[error("DECODE_ERROR: {0}")]
    Decode(String),

    /// Request superseded by a newer one. Internal bookkeeping only.
    #[error("CANCELLED")]
    Cancelled,

    /// Mutation rejected by the backend.
    #[error("VALIDATION_ERROR: {0}")]
    Validation(String),

    /// Invalid caller input (e.g. an empty resource name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Preference store failure.
    #[error("STORAGE_ERROR: {0}")]
    Storage(String),

    /// The cache has been shut down.
    #[error("CLOSED: query cache is shut down")]
    Closed,
}

impl SyncError {
    /// Whether a fetch failing with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout(_) => true,
            SyncError::Http { status } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the error should reach UI-facing state.
    ///
    /// `Cancelled` is filtered out before it gets there.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, SyncError::Cancelled)
    }
}

impl From<tokio_rusqlite::Error<SyncError>> for SyncError {
    fn from(err: tokio_rusqlite::Error<SyncError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            other => SyncError::Storage(other.to_string()),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for SyncError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}
