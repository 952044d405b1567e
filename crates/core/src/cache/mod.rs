//! In-memory query cache.
//!
//! A keyed store of async query results shared by every collection and
//! search box in the process. It provides:
//!
//! - Request coalescing: at most one in-flight fetch per key
//! - Stale-while-revalidate: data stays visible while it is refetched or after a failed refetch
//! - Exact and prefix invalidation, with immediate refetch for observed entries
//! - Sequence-guarded updates: only the response to the latest request for a key is applied
//! - Subscriber notification on every state transition
//! - Garbage collection of unobserved entries after a grace period
//!
//! The cache is the only mutator of its entries; everyone else reads
//! [`EntrySnapshot`]s.

pub mod entry;
mod fetch;
mod subscription;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::key::QueryKey;
use crate::model::{Invalidation, QueryData};

use entry::{CacheEntry, InFlight, SharedFetch};

pub use entry::{EntrySnapshot, Status};
pub use fetch::{FetchOptions, Fetcher, fetcher};
pub use subscription::{Callback, Subscription};

type Notifications = Vec<(Callback, EntrySnapshot)>;

/// Cache-wide settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Grace period before an entry without subscribers is dropped.
    pub gc_time: Duration,
    /// Options used by entries created through `subscribe`.
    pub fetch: FetchOptions,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { gc_time: Duration::from_secs(300), fetch: FetchOptions::default() }
    }
}

impl From<&SyncConfig> for CacheConfig {
    fn from(config: &SyncConfig) -> Self {
        Self { gc_time: config.gc_time(), fetch: config.fetch_options() }
    }
}

/// Process-wide query cache handle.
///
/// Cloning is cheap; all clones share one store. Construct it once and inject
/// it into every consumer.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

pub(crate) struct CacheInner {
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    config: CacheConfig,
    next_subscriber: AtomicU64,
    closed: AtomicBool,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                config,
                next_subscriber: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.inner.closed.load(Ordering::Acquire) { Err(SyncError::Closed) } else { Ok(()) }
    }

    /// Current entry for `key`, starting a background fetch if the entry is absent or stale.
    ///
    /// Never waits for the network. A failed entry is not refetched here; use
    /// [`QueryCache::fetch`] to retry it.
    ///
    /// # Panics
    ///
    /// Panics if a fetch must be started outside a Tokio runtime.
    pub fn get(&self, key: &QueryKey, fetcher: Fetcher, options: &FetchOptions) -> Result<EntrySnapshot, SyncError> {
        self.ensure_open()?;
        let now = Instant::now();

        let (snapshot, notifications) = {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(key.clone(), options.clone()));
            entry.fetcher = Some(fetcher.clone());
            entry.options = options.clone();

            let mut notifications = Vec::new();
            if entry.needs_fetch(now) {
                tracing::debug!(key = %key, "cache miss, fetching in background");
                start_fetch(&self.inner, entry, fetcher);
                notifications = entry.notifications(now);
            }
            (entry.snapshot(now), notifications)
        };

        deliver(notifications);
        Ok(snapshot)
    }

    /// Data for `key`, waiting for the network if the cached data is absent, stale or failed.
    ///
    /// Concurrent calls share a single in-flight fetch. If that fetch is
    /// superseded while awaited, the call re-joins the newer one.
    pub async fn fetch(
        &self, key: &QueryKey, fetcher: Fetcher, options: &FetchOptions,
    ) -> Result<Arc<QueryData>, SyncError> {
        loop {
            self.ensure_open()?;
            let now = Instant::now();

            let (future, notifications): (SharedFetch, Notifications) = {
                let mut entries = self.inner.entries.lock();
                let entry = entries
                    .entry(key.clone())
                    .or_insert_with(|| CacheEntry::new(key.clone(), options.clone()));
                entry.fetcher = Some(fetcher.clone());
                entry.options = options.clone();

                if entry.is_fresh(now)
                    && let Some(data) = &entry.data
                {
                    tracing::debug!(key = %key, "cache hit");
                    return Ok(data.clone());
                }

                let joined = entry.inflight.as_ref().map(|f| (f.sequence, f.future.clone()));
                match joined {
                    Some((sequence, future)) => {
                        tracing::debug!(key = %key, sequence, "joining in-flight fetch");
                        (future, Vec::new())
                    }
                    None => {
                        let future = start_fetch(&self.inner, entry, fetcher.clone());
                        (future, entry.notifications(now))
                    }
                }
            };

            deliver(notifications);

            match future.await {
                Err(SyncError::Cancelled) => {
                    tracing::debug!(key = %key, "awaited fetch was superseded, re-joining");
                }
                result => return result,
            }
        }
    }

    /// Mark every entry matching `request` stale.
    ///
    /// Observed entries are refetched immediately; unobserved ones on next
    /// access. A fetch already in flight for a matching key is superseded and
    /// its response dropped on arrival. Safe to repeat.
    ///
    /// Returns the number of matching entries.
    ///
    /// # Panics
    ///
    /// Panics if an observed entry must be refetched outside a Tokio runtime.
    pub fn invalidate(&self, request: &Invalidation) -> Result<usize, SyncError> {
        self.ensure_open()?;
        let now = Instant::now();

        let (matched, refetched, notifications) = {
            let mut entries = self.inner.entries.lock();
            let mut matched = 0;
            let mut refetched = 0;
            let mut notifications = Vec::new();

            for entry in entries.values_mut().filter(|e| request.matches(&e.key)) {
                matched += 1;

                let superseded = entry.inflight.take().is_some();
                entry.status = if entry.data.is_some() { Status::Stale } else { Status::Pending };

                if !entry.subscribers.is_empty()
                    && let Some(fetcher) = entry.fetcher.clone()
                {
                    start_fetch(&self.inner, entry, fetcher);
                    refetched += 1;
                } else if superseded {
                    // the running fetch predates the invalidation; its response must not land
                    entry.sequence += 1;
                }
                notifications.extend(entry.notifications(now));
            }
            (matched, refetched, notifications)
        };

        deliver(notifications);

        tracing::info!(
            key = %request.key,
            scope = ?request.scope,
            matched,
            refetched,
            "invalidated cache entries"
        );
        Ok(matched)
    }

    /// Register `callback` for state transitions of `key`.
    ///
    /// Creates the entry if needed and cancels any pending garbage collection.
    pub fn subscribe(&self, key: &QueryKey, callback: Callback) -> Result<Subscription, SyncError> {
        self.ensure_open()?;
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.inner.entries.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(key.clone(), self.inner.config.fetch.clone()));
        entry.subscribers.insert(id, callback);
        entry.gc_generation += 1;

        Ok(Subscription::new(Arc::downgrade(&self.inner), key.clone(), id))
    }

    pub fn snapshot(&self, key: &QueryKey) -> Option<EntrySnapshot> {
        let now = Instant::now();
        self.inner.entries.lock().get(key).map(|entry| entry.snapshot(now))
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort in-flight fetches and drop every entry.
    ///
    /// Later calls fail with [`SyncError::Closed`].
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let drained: Vec<CacheEntry> = self.inner.entries.lock().drain().map(|(_, entry)| entry).collect();

        let mut aborted = 0;
        for entry in &drained {
            if let Some(inflight) = &entry.inflight {
                inflight.abort.abort();
                aborted += 1;
            }
        }
        tracing::info!(entries = drained.len(), aborted, "query cache shut down");
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

fn deliver(notifications: Notifications) {
    for (callback, snapshot) in notifications {
        callback(&snapshot);
    }
}

/// Issue a new sequence for `entry` and spawn its fetch.
fn start_fetch(inner: &Arc<CacheInner>, entry: &mut CacheEntry, fetcher: Fetcher) -> SharedFetch {
    entry.sequence += 1;
    let sequence = entry.sequence;
    let key = entry.key.clone();
    let options = entry.options.clone();
    let cache = Arc::downgrade(inner);

    tracing::debug!(key = %key, fingerprint = %key.fingerprint(), sequence, "issuing fetch");

    let task = tokio::spawn(async move {
        let result = fetch::run_with_retry(&key, &fetcher, &options).await;
        match cache.upgrade() {
            Some(inner) => complete(&inner, &key, sequence, result),
            None => Err(SyncError::Closed),
        }
    });
    let abort = task.abort_handle();
    let future = async move { task.await.unwrap_or(Err(SyncError::Closed)) }.boxed().shared();

    entry.inflight = Some(InFlight { sequence, future: future.clone(), abort });
    future
}

/// Apply a fetch result if `sequence` is still the latest for `key`.
fn complete(
    inner: &Arc<CacheInner>, key: &QueryKey, sequence: u64, result: Result<QueryData, SyncError>,
) -> Result<Arc<QueryData>, SyncError> {
    let now = Instant::now();

    let (outcome, notifications) = {
        let mut entries = inner.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return Err(SyncError::Closed);
        };

        if entry.sequence != sequence {
            tracing::debug!(key = %key, sequence, latest = entry.sequence, "discarding superseded response");
            // an unobserved entry invalidated mid-fetch gets no other chance to be collected
            if entry.subscribers.is_empty() && entry.inflight.is_none() {
                schedule_gc(inner, entry);
            }
            return Err(SyncError::Cancelled);
        }

        entry.inflight = None;
        let outcome = match result {
            Ok(data) => {
                let data = Arc::new(data);
                entry.data = Some(data.clone());
                entry.status = Status::Success;
                entry.error = None;
                entry.fetched_at = Some(Utc::now());
                entry.loaded_at = Some(now);
                Ok(data)
            }
            Err(err) => {
                tracing::debug!(key = %key, sequence, error = %err, "fetch failed, keeping previous data");
                entry.status = Status::Error;
                entry.error = Some(err.clone());
                Err(err)
            }
        };

        if entry.subscribers.is_empty() {
            schedule_gc(inner, entry);
        }
        (outcome, entry.notifications(now))
    };

    deliver(notifications);
    outcome
}

pub(crate) fn unsubscribe(inner: &Arc<CacheInner>, key: &QueryKey, id: u64) {
    let mut entries = inner.entries.lock();
    if let Some(entry) = entries.get_mut(key) {
        entry.subscribers.remove(&id);
        if entry.subscribers.is_empty() && entry.inflight.is_none() {
            schedule_gc(inner, entry);
        }
    }
}

fn schedule_gc(inner: &Arc<CacheInner>, entry: &mut CacheEntry) {
    entry.gc_generation += 1;
    let generation = entry.gc_generation;
    let key = entry.key.clone();
    let cache = Arc::downgrade(inner);
    let gc_time = inner.config.gc_time;

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(gc_time).await;
                if let Some(inner) = cache.upgrade() {
                    collect(&inner, &key, generation);
                }
            });
        }
        Err(_) => tracing::debug!(key = %key, "no runtime for garbage collection, keeping entry"),
    }
}

fn collect(inner: &CacheInner, key: &QueryKey, generation: u64) {
    let mut entries = inner.entries.lock();
    let collectable = entries
        .get(key)
        .is_some_and(|e| e.gc_generation == generation && e.subscribers.is_empty() && e.inflight.is_none());
    if collectable {
        entries.remove(key);
        tracing::debug!(key = %key, "collected unobserved cache entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemId, SearchHit};
    use crate::query_key;
    use std::sync::atomic::AtomicU32;

    fn hits(labels: &[&str]) -> QueryData {
        QueryData::Hits(
            labels
                .iter()
                .enumerate()
                .map(|(i, label)| SearchHit { id: ItemId::Int(i as i64), label: label.to_string() })
                .collect(),
        )
    }

    fn labels(data: &QueryData) -> Vec<String> {
        data.as_hits().unwrap().iter().map(|h| h.label.clone()).collect()
    }

    fn options() -> FetchOptions {
        FetchOptions { attempts: 1, ..Default::default() }
    }

    fn noop() -> Callback {
        Arc::new(|_: &EntrySnapshot| {})
    }

    /// Fetcher that counts calls and answers `label-N` after `delay`.
    fn counting_fetcher(calls: Arc<AtomicU32>, delay: Duration) -> Fetcher {
        fetcher(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(delay).await;
                Ok(hits(&[&format!("label-{n}")]))
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_are_coalesced() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let f = counting_fetcher(calls.clone(), Duration::from_millis(50));
        let key = query_key!["app", "communities", "list"];

        let opts = options();
        let results = futures_util::future::join_all((0..10).map(|_| cache.fetch(&key, f.clone(), &opts))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(labels(&result.unwrap()), vec!["label-0"]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_starts_one_background_fetch() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let f = counting_fetcher(calls.clone(), Duration::from_millis(50));
        let key = query_key!["events", "list"];

        let first = cache.get(&key, f.clone(), &options()).unwrap();
        assert_eq!(first.status, Status::Pending);
        assert!(first.is_fetching);
        assert!(first.data.is_none());

        let second = cache.get(&key, f.clone(), &options()).unwrap();
        assert!(second.is_fetching);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let loaded = cache.get(&key, f, &options()).unwrap();
        assert_eq!(loaded.status, Status::Success);
        assert!(!loaded.is_fetching);
        assert_eq!(loaded.sequence, 1);
        assert!(loaded.fetched_at.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_data_is_served_without_fetching() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let f = counting_fetcher(calls.clone(), Duration::ZERO);
        let key = query_key!["posts", "detail", 3i64];

        cache.fetch(&key, f.clone(), &options()).await.unwrap();
        cache.fetch(&key, f, &options()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aged_data_is_refetched() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let f = counting_fetcher(calls.clone(), Duration::ZERO);
        let key = query_key!["posts", "list"];
        let opts = FetchOptions { stale_time: Duration::from_secs(5), ..options() };

        cache.fetch(&key, f.clone(), &opts).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        let snapshot = cache.get(&key, f, &opts).unwrap();
        assert_eq!(snapshot.status, Status::Stale);
        assert!(snapshot.is_fetching);
        // stale-while-revalidate: the old data is still readable
        assert_eq!(labels(snapshot.data.as_ref().unwrap()), vec!["label-0"]);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(labels(cache.snapshot(&key).unwrap().data.as_ref().unwrap()), vec!["label-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidation_keeps_data_visible() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let f = counting_fetcher(calls.clone(), Duration::from_millis(20));
        let key = query_key!["market", "list"];

        cache.fetch(&key, f.clone(), &options()).await.unwrap();
        cache.invalidate(&Invalidation::exact(key.clone())).unwrap();

        let snapshot = cache.snapshot(&key).unwrap();
        assert_eq!(snapshot.status, Status::Stale);
        assert_eq!(labels(snapshot.data.as_ref().unwrap()), vec!["label-0"]);
        // no subscribers: nothing refetched yet
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let data = cache.fetch(&key, f, &options()).await.unwrap();
        assert_eq!(labels(&data), vec!["label-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refetch_preserves_data() {
        let cache = QueryCache::default();
        let key = query_key!["events", "detail", 9i64];
        let ok = fetcher(|| async { Ok(hits(&["kept"])) });
        let failing = fetcher(|| async { Err(SyncError::Http { status: 404 }) });

        cache.fetch(&key, ok, &options()).await.unwrap();
        cache.invalidate(&Invalidation::exact(key.clone())).unwrap();

        let result = cache.fetch(&key, failing, &options()).await;
        assert_eq!(result.unwrap_err(), SyncError::Http { status: 404 });

        let snapshot = cache.snapshot(&key).unwrap();
        assert_eq!(snapshot.status, Status::Error);
        assert!(snapshot.is_error());
        assert_eq!(snapshot.error, Some(SyncError::Http { status: 404 }));
        assert_eq!(labels(snapshot.data.as_ref().unwrap()), vec!["kept"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefix_invalidation_matches_leading_segments() {
        let cache = QueryCache::default();
        let f = fetcher(|| async { Ok(hits(&["x"])) });
        let list = query_key!["app", "communities", "list"];
        let detail = query_key!["app", "communities", "detail", 7i64];
        let events = query_key!["app", "events", "list"];

        for key in [&list, &detail, &events] {
            cache.fetch(key, f.clone(), &options()).await.unwrap();
        }

        let matched = cache.invalidate(&Invalidation::prefix(query_key!["app", "communities"])).unwrap();
        assert_eq!(matched, 2);
        assert_eq!(cache.snapshot(&list).unwrap().status, Status::Stale);
        assert_eq!(cache.snapshot(&detail).unwrap().status, Status::Stale);
        assert_eq!(cache.snapshot(&events).unwrap().status, Status::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_entries_refetch_on_invalidation() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let f = counting_fetcher(calls.clone(), Duration::from_millis(10));
        let key = query_key!["communities", "list"];

        let _subscription = cache.subscribe(&key, noop()).unwrap();
        cache.fetch(&key, f, &options()).await.unwrap();

        cache.invalidate(&Invalidation::prefix(query_key!["communities"])).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let snapshot = cache.snapshot(&key).unwrap();
        assert_eq!(snapshot.status, Status::Success);
        assert_eq!(labels(snapshot.data.as_ref().unwrap()), vec!["label-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_invalidation_is_safe() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let f = counting_fetcher(calls.clone(), Duration::from_millis(10));
        let key = query_key!["posts", "list"];

        let _subscription = cache.subscribe(&key, noop()).unwrap();
        cache.fetch(&key, f, &options()).await.unwrap();

        let request = Invalidation::exact(key.clone());
        assert_eq!(cache.invalidate(&request).unwrap(), 1);
        assert_eq!(cache.invalidate(&request).unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = cache.snapshot(&key).unwrap();
        assert_eq!(snapshot.status, Status::Success);
        assert!(!snapshot.is_fetching);
        assert_eq!(labels(snapshot.data.as_ref().unwrap()), vec!["label-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_response_is_discarded() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        // first request is slow, the second fast
        let f = fetcher(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let delay = if n == 0 { 200 } else { 10 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(hits(&[if n == 0 { "old" } else { "new" }]))
            }
        });
        let key = query_key!["search", "market", "bike"];
        let _subscription = cache.subscribe(&key, noop()).unwrap();

        let waiter = {
            let cache = cache.clone();
            let key = key.clone();
            let f = f.clone();
            tokio::spawn(async move { cache.fetch(&key, f, &options()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.invalidate(&Invalidation::exact(key.clone())).unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        let snapshot = cache.snapshot(&key).unwrap();
        assert_eq!(labels(snapshot.data.as_ref().unwrap()), vec!["new"]);
        assert_eq!(snapshot.sequence, 2);
        // the waiter of the superseded request observes the newer result
        assert_eq!(labels(&waiter.await.unwrap().unwrap()), vec!["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_each_transition() {
        let cache = QueryCache::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let key = query_key!["events", "list"];

        let callback: Callback =
            Arc::new(move |snapshot: &EntrySnapshot| sink.lock().push((snapshot.status, snapshot.is_fetching)));
        let _subscription = cache.subscribe(&key, callback).unwrap();
        cache.fetch(&key, fetcher(|| async { Ok(hits(&["a"])) }), &options()).await.unwrap();

        assert_eq!(*seen.lock(), vec![(Status::Pending, true), (Status::Success, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_entry_is_collected_after_grace_period() {
        let cache = QueryCache::new(CacheConfig { gc_time: Duration::from_secs(60), ..Default::default() });
        let key = query_key!["communities", "detail", 1i64];

        let mut subscription = cache.subscribe(&key, noop()).unwrap();
        cache.fetch(&key, fetcher(|| async { Ok(hits(&["a"])) }), &options()).await.unwrap();
        subscription.unsubscribe();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(cache.contains(&key));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!cache.contains(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_entry_invalidated_mid_fetch_is_collected() {
        let cache = QueryCache::new(CacheConfig { gc_time: Duration::from_secs(60), ..Default::default() });
        let calls = Arc::new(AtomicU32::new(0));
        let key = query_key!["market", "detail", 4i64];

        cache.get(&key, counting_fetcher(calls, Duration::from_millis(100)), &options()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(&Invalidation::exact(key.clone())).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = cache.snapshot(&key).unwrap();
        assert_eq!(snapshot.subscriber_count, 0);
        assert!(!snapshot.is_fetching);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(!cache.contains(&key));
    }

    #[test]
    #[should_panic]
    fn test_get_outside_runtime_panics() {
        let cache = QueryCache::default();
        let f = fetcher(|| async { Ok(hits(&["a"])) });
        let _ = cache.get(&query_key!["events", "list"], f, &options());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_cancels_collection() {
        let cache = QueryCache::new(CacheConfig { gc_time: Duration::from_secs(60), ..Default::default() });
        let key = query_key!["posts", "list"];

        drop(cache.subscribe(&key, noop()).unwrap());
        tokio::time::sleep(Duration::from_secs(30)).await;
        let _again = cache.subscribe(&key, noop()).unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(cache.contains(&key));
        assert_eq!(cache.snapshot(&key).unwrap().subscriber_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_cache() {
        let cache = QueryCache::default();
        let key = query_key!["events", "list"];
        cache.fetch(&key, fetcher(|| async { Ok(hits(&["a"])) }), &options()).await.unwrap();

        cache.shutdown();
        assert!(cache.is_empty());
        let result = cache.fetch(&key, fetcher(|| async { Ok(hits(&["a"])) }), &options()).await;
        assert_eq!(result.unwrap_err(), SyncError::Closed);
        assert_eq!(cache.invalidate(&Invalidation::exact(key)).unwrap_err(), SyncError::Closed);
    }
}
