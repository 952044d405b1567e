//! Cache entries and the read-only snapshots handed to readers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, Shared};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::fetch::{FetchOptions, Fetcher};
use super::subscription::Callback;
use crate::error::SyncError;
use crate::key::QueryKey;
use crate::model::QueryData;

pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<Arc<QueryData>, SyncError>>>;

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No data has been loaded yet.
    Pending,
    /// Data is loaded and fresh.
    Success,
    /// Data is loaded but invalidated or older than its stale time.
    Stale,
    /// The last fetch failed. Earlier data, if any, is kept.
    Error,
}

/// Immutable view of a cache entry.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub key: QueryKey,
    pub status: Status,
    pub data: Option<Arc<QueryData>>,
    pub error: Option<SyncError>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub sequence: u64,
    pub subscriber_count: usize,
    pub is_fetching: bool,
}

impl EntrySnapshot {
    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }
}

pub(crate) struct InFlight {
    pub sequence: u64,
    pub future: SharedFetch,
    pub abort: AbortHandle,
}

pub(crate) struct CacheEntry {
    pub key: QueryKey,
    pub status: Status,
    pub data: Option<Arc<QueryData>>,
    pub error: Option<SyncError>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub loaded_at: Option<Instant>,
    /// Latest issued sequence; only a response carrying it is applied.
    pub sequence: u64,
    pub subscribers: HashMap<u64, Callback>,
    pub inflight: Option<InFlight>,
    pub fetcher: Option<Fetcher>,
    pub options: FetchOptions,
    pub gc_generation: u64,
}

impl CacheEntry {
    pub fn new(key: QueryKey, options: FetchOptions) -> Self {
        Self {
            key,
            status: Status::Pending,
            data: None,
            error: None,
            fetched_at: None,
            loaded_at: None,
            sequence: 0,
            subscribers: HashMap::new(),
            inflight: None,
            fetcher: None,
            options,
            gc_generation: 0,
        }
    }

    /// Status as readers see it: fresh data past its stale time reads as stale.
    pub fn effective_status(&self, now: Instant) -> Status {
        match (self.status, self.loaded_at) {
            (Status::Success, Some(loaded)) if now.duration_since(loaded) >= self.options.stale_time => Status::Stale,
            (status, _) => status,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.data.is_some() && self.effective_status(now) == Status::Success
    }

    /// Absent or stale data with nothing in flight.
    pub fn needs_fetch(&self, now: Instant) -> bool {
        if self.inflight.is_some() {
            return false;
        }
        match self.effective_status(now) {
            Status::Pending | Status::Stale => true,
            Status::Success | Status::Error => false,
        }
    }

    pub fn snapshot(&self, now: Instant) -> EntrySnapshot {
        EntrySnapshot {
            key: self.key.clone(),
            status: self.effective_status(now),
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            sequence: self.sequence,
            subscriber_count: self.subscribers.len(),
            is_fetching: self.inflight.is_some(),
        }
    }

    /// Subscriber callbacks paired with the current snapshot, for delivery outside the lock.
    pub fn notifications(&self, now: Instant) -> Vec<(Callback, EntrySnapshot)> {
        if self.subscribers.is_empty() {
            return Vec::new();
        }
        let snapshot = self.snapshot(now);
        self.subscribers
            .values()
            .map(|callback| (callback.clone(), snapshot.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SearchHit;
    use crate::query_key;
    use std::time::Duration;

    fn loaded_entry(stale_time: Duration) -> CacheEntry {
        let options = FetchOptions { stale_time, ..Default::default() };
        let mut entry = CacheEntry::new(query_key!["search", "x"], options);
        entry.status = Status::Success;
        entry.data = Some(Arc::new(QueryData::Hits(Vec::<SearchHit>::new())));
        entry.loaded_at = Some(Instant::now());
        entry
    }

    #[test]
    fn test_new_entry_needs_fetch() {
        let entry = CacheEntry::new(query_key!["a"], FetchOptions::default());
        assert_eq!(entry.status, Status::Pending);
        assert!(entry.needs_fetch(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_ages_into_stale() {
        let entry = loaded_entry(Duration::from_secs(10));
        assert!(entry.is_fresh(Instant::now()));
        assert!(!entry.needs_fetch(Instant::now()));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(entry.effective_status(Instant::now()), Status::Stale);
        assert!(entry.needs_fetch(Instant::now()));
        assert!(entry.data.is_some());
    }

    #[test]
    fn test_error_does_not_trigger_lazy_fetch() {
        let mut entry = loaded_entry(Duration::from_secs(10));
        entry.status = Status::Error;
        assert!(!entry.needs_fetch(Instant::now()));
    }
}
