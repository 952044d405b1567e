//! Debounced typeahead search.
//!
//! Every keystroke is numbered. A query is issued only once input has been
//! idle for the debounce delay, and its response is applied only if no newer
//! keystroke arrived in the meantime, so a slow response to an old prefix can
//! never overwrite the results of a newer one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::cache::{FetchOptions, QueryCache, fetcher};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::model::{QueryData, SearchHit, SearchQuery};
use crate::source::DataSource;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Idle time after the last keystroke before a query is issued.
    pub debounce: Duration,
    /// Maximum number of hits kept per query.
    pub page_size: u32,
    pub fetch: FetchOptions,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(300), page_size: 10, fetch: FetchOptions::default() }
    }
}

impl From<&SyncConfig> for SearchOptions {
    fn from(config: &SyncConfig) -> Self {
        Self { debounce: config.debounce(), page_size: config.search_page_size, fetch: config.fetch_options() }
    }
}

/// What the search box shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    /// Input the hits belong to.
    pub input: String,
    /// Sequence number of the input the state reflects.
    pub sequence: u64,
    pub hits: Vec<SearchHit>,
    pub is_loading: bool,
    pub error: Option<SyncError>,
}

struct SearchShared {
    cache: QueryCache,
    source: Arc<dyn DataSource>,
    storage: String,
    options: SearchOptions,
    latest: AtomicU64,
    state: watch::Sender<SearchState>,
}

impl SearchShared {
    fn is_latest(&self, sequence: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == sequence
    }

    /// Publish `state` unless a newer keystroke has been recorded.
    fn apply(&self, state: SearchState) -> bool {
        self.state.send_if_modified(|current| {
            if !self.is_latest(state.sequence) || current.sequence > state.sequence {
                return false;
            }
            *current = state;
            true
        })
    }
}

/// Typeahead bound to one storage (one input field).
///
/// Cloning is cheap; clones share the sequence counter and the published state.
#[derive(Clone)]
pub struct SearchAhead {
    shared: Arc<SearchShared>,
}

impl SearchAhead {
    pub fn new(
        cache: QueryCache, source: Arc<dyn DataSource>, storage: impl Into<String>, options: SearchOptions,
    ) -> Result<Self, SyncError> {
        let storage = storage.into();
        if storage.trim().is_empty() {
            return Err(SyncError::InvalidInput("search storage cannot be empty".into()));
        }
        if options.page_size == 0 {
            return Err(SyncError::InvalidInput("search page size must be at least 1".into()));
        }

        let (state, _) = watch::channel(SearchState::default());
        Ok(Self {
            shared: Arc::new(SearchShared { cache, source, storage, options, latest: AtomicU64::new(0), state }),
        })
    }

    pub fn storage(&self) -> &str {
        &self.shared.storage
    }

    pub fn state(&self) -> SearchState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.shared.state.subscribe()
    }

    /// Record a keystroke and schedule its query.
    ///
    /// Returns the sequence number issued for `value`. Blank input clears
    /// the results immediately without touching the network. Must be called
    /// within a tokio runtime.
    pub fn on_input(&self, value: &str) -> u64 {
        let sequence = self.shared.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let keyword = value.trim();

        if keyword.is_empty() {
            self.shared.apply(SearchState { input: value.to_string(), sequence, ..Default::default() });
            return sequence;
        }

        self.shared.state.send_modify(|state| state.is_loading = true);
        let query = SearchQuery {
            storage: self.shared.storage.clone(),
            keyword: keyword.to_string(),
            size: self.shared.options.page_size,
        };
        tokio::spawn(run_query(self.shared.clone(), sequence, value.to_string(), query));
        sequence
    }

    /// Drop pending queries and empty the results.
    pub fn clear(&self) {
        let sequence = self.shared.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.apply(SearchState { sequence, ..Default::default() });
    }
}

impl std::fmt::Debug for SearchAhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchAhead")
            .field("storage", &self.shared.storage)
            .field("latest", &self.shared.latest.load(Ordering::SeqCst))
            .finish()
    }
}

async fn run_query(shared: Arc<SearchShared>, sequence: u64, input: String, query: SearchQuery) {
    tokio::time::sleep(shared.options.debounce).await;
    if !shared.is_latest(sequence) {
        tracing::trace!(sequence, keyword = %query.keyword, "keystroke superseded during debounce");
        return;
    }

    let key = query.key();
    let size = query.size as usize;
    let source = shared.source.clone();
    let search = fetcher(move || {
        let source = source.clone();
        let query = query.clone();
        async move {
            let mut hits = source.search(&query).await?;
            hits.truncate(size);
            Ok(QueryData::Hits(hits))
        }
    });

    let result = shared
        .cache
        .fetch(&key, search, &shared.options.fetch)
        .await
        .and_then(|data| data.as_hits().map(|hits| hits.iter().take(size).cloned().collect::<Vec<_>>()));

    let state = match result {
        Ok(hits) => SearchState { input, sequence, hits, is_loading: false, error: None },
        Err(err) if !err.is_user_facing() => return,
        Err(err) => {
            tracing::warn!(key = %key, error = %err, "search failed");
            SearchState { input, sequence, hits: Vec::new(), is_loading: false, error: Some(err) }
        }
    };

    if !shared.apply(state) {
        tracing::debug!(key = %key, sequence, "discarding out-of-order search response");
    }
}
