//! Fetch execution: per-attempt timeout and bounded exponential retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::error::SyncError;
use crate::key::QueryKey;
use crate::model::QueryData;

/// A reusable fetch operation. Called once per attempt.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<QueryData, SyncError>> + Send + Sync>;

/// Wrap an async closure as a [`Fetcher`].
pub fn fetcher<F, Fut>(f: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<QueryData, SyncError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Per-query fetch behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Total attempts for retryable failures.
    pub attempts: u32,
    /// Delay before the first retry; doubled for each further one.
    pub base_delay: Duration,
    /// Age after which data is served stale and refetched.
    pub stale_time: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            attempts: 3,
            base_delay: Duration::from_millis(200),
            stale_time: Duration::from_secs(30),
        }
    }
}

/// Run `fetcher` until it succeeds, fails with a non-retryable error, or attempts run out.
pub(crate) async fn run_with_retry(
    key: &QueryKey, fetcher: &Fetcher, options: &FetchOptions,
) -> Result<QueryData, SyncError> {
    let attempts = options.attempts.max(1);
    let mut delay = options.base_delay;
    let mut attempt = 1;

    loop {
        let result = match tokio::time::timeout(options.timeout, fetcher()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(options.timeout.as_millis() as u64)),
        };

        match result {
            Err(err) if err.is_retryable() && attempt < attempts => {
                tracing::warn!(key = %key, attempt, error = %err, "fetch failed, retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            other => return other,
        }
    }
}
