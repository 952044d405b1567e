//! Infinite collections: successive pages merged into one ordered list.
//!
//! Each page is fetched through the [`QueryCache`] under the collection's base
//! key plus the page token, and merged into the list with first-occurrence-wins
//! deduplication by item id. A filter change produces a fresh collection state
//! under a new key; responses still in flight for the old key are dropped when
//! they arrive.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cache::{EntrySnapshot, FetchOptions, QueryCache, Status, Subscription, fetcher};
use crate::error::SyncError;
use crate::key::QueryKey;
use crate::model::{Item, ItemId, ListQuery, Page, PageToken, QueryData};
use crate::source::DataSource;
use crate::window::VirtualRange;

type PendingFetch = Shared<BoxFuture<'static, Result<CollectionState, SyncError>>>;

/// Published state of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState {
    pub key: QueryKey,
    pub items: Vec<Item>,
    pub next_token: Option<PageToken>,
    pub has_next: bool,
    pub is_loading: bool,
    pub is_error: bool,
    pub error: Option<SyncError>,
    pub pages_loaded: usize,
}

impl CollectionState {
    fn new(key: QueryKey) -> Self {
        Self {
            key,
            items: Vec::new(),
            next_token: Some(PageToken::first()),
            has_next: true,
            is_loading: false,
            is_error: false,
            error: None,
            pages_loaded: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A page as it was merged, kept so the list can be rebuilt after a refetch.
struct PageSlot {
    key: QueryKey,
    items: Vec<Item>,
}

struct Inner {
    query: ListQuery,
    generation: u64,
    state: CollectionState,
    pages: Vec<PageSlot>,
    seen: HashSet<ItemId>,
    pending: Option<PendingFetch>,
    subscriptions: Vec<Subscription>,
}

impl Inner {
    fn new(query: ListQuery, generation: u64) -> Self {
        let state = CollectionState::new(query.key());
        Self {
            query,
            generation,
            state,
            pages: Vec::new(),
            seen: HashSet::new(),
            pending: None,
            subscriptions: Vec::new(),
        }
    }

    fn append_page(&mut self, key: QueryKey, page: &Page) {
        for item in &page.items {
            if self.seen.insert(item.id.clone()) {
                self.state.items.push(item.clone());
            }
        }
        self.pages.push(PageSlot { key, items: page.items.clone() });
        self.state.pages_loaded = self.pages.len();
        self.state.has_next = page.has_next;
        self.state.next_token = page.next_token();
    }

    /// Re-merge every page in page order.
    fn rebuild(&mut self) {
        self.seen.clear();
        self.state.items.clear();
        for slot in &self.pages {
            for item in &slot.items {
                if self.seen.insert(item.id.clone()) {
                    self.state.items.push(item.clone());
                }
            }
        }
    }
}

struct CollectionShared {
    cache: QueryCache,
    source: Arc<dyn DataSource>,
    options: FetchOptions,
    inner: Mutex<Inner>,
    changes: watch::Sender<CollectionState>,
}

impl CollectionShared {
    fn publish(&self, state: &CollectionState) {
        self.changes.send_replace(state.clone());
    }
}

/// Paginated, deduplicated view of one filter combination at a time.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct InfiniteCollection {
    shared: Arc<CollectionShared>,
}

impl InfiniteCollection {
    pub fn new(
        cache: QueryCache, source: Arc<dyn DataSource>, query: ListQuery, options: FetchOptions,
    ) -> Result<Self, SyncError> {
        query.validate()?;
        let inner = Inner::new(query, 0);
        let (changes, _) = watch::channel(inner.state.clone());
        Ok(Self { shared: Arc::new(CollectionShared { cache, source, options, inner: Mutex::new(inner), changes }) })
    }

    pub fn query(&self) -> ListQuery {
        self.shared.inner.lock().query.clone()
    }

    pub fn key(&self) -> QueryKey {
        self.shared.inner.lock().state.key.clone()
    }

    pub fn snapshot(&self) -> CollectionState {
        self.shared.inner.lock().state.clone()
    }

    /// Receiver for every published state change.
    pub fn subscribe(&self) -> watch::Receiver<CollectionState> {
        self.shared.changes.subscribe()
    }

    /// Fetch and merge the next page.
    ///
    /// Calls made while a page is loading share that load. Once the last page
    /// is merged, or after a pagination error, this is a no-op returning the
    /// current state; see [`InfiniteCollection::retry`].
    pub async fn fetch_next(&self) -> Result<CollectionState, SyncError> {
        let future = {
            let mut inner = self.shared.inner.lock();
            if let Some(pending) = &inner.pending {
                tracing::debug!(key = %inner.state.key, "joining pending page fetch");
                pending.clone()
            } else {
                let token = match &inner.state.next_token {
                    Some(token) if inner.state.has_next && !inner.state.is_error => token.clone(),
                    _ => return Ok(inner.state.clone()),
                };

                inner.state.is_loading = true;
                self.shared.publish(&inner.state);

                // spawned so the load finishes and clears `pending` even if every caller goes away
                let task = tokio::spawn(load_page(self.shared.clone(), inner.generation, inner.query.clone(), token));
                let future = async move { task.await.unwrap_or(Err(SyncError::Cancelled)) }.boxed().shared();
                inner.pending = Some(future.clone());
                future
            }
        };

        future.await
    }

    /// Fetch the next page only if `range` reaches the end of the merged list.
    pub async fn fetch_for_range(&self, range: &VirtualRange) -> Result<CollectionState, SyncError> {
        let state = self.snapshot();
        if state.has_next && range.reaches_end(state.items.len()) {
            self.fetch_next().await
        } else {
            Ok(state)
        }
    }

    /// Clear a pagination error and fetch the page that failed.
    pub async fn retry(&self) -> Result<CollectionState, SyncError> {
        {
            let mut inner = self.shared.inner.lock();
            inner.state.is_error = false;
            inner.state.error = None;
        }
        self.fetch_next().await
    }

    /// Switch to a new filter combination.
    ///
    /// The previous state is discarded outright and a fresh one is published
    /// under the new key. Loads still running for the old key complete but
    /// are never merged.
    pub fn set_query(&self, query: ListQuery) -> Result<(), SyncError> {
        query.validate()?;
        let dropped = {
            let mut inner = self.shared.inner.lock();
            if inner.query == query {
                return Ok(());
            }
            let generation = inner.generation + 1;
            let previous = std::mem::replace(&mut *inner, Inner::new(query, generation));
            tracing::info!(from = %previous.state.key, to = %inner.state.key, "collection filter changed");
            self.shared.publish(&inner.state);
            previous.subscriptions
        };
        // unsubscribing takes the cache lock
        drop(dropped);
        Ok(())
    }
}

impl std::fmt::Debug for InfiniteCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("InfiniteCollection")
            .field("key", &inner.state.key)
            .field("len", &inner.state.items.len())
            .field("has_next", &inner.state.has_next)
            .finish()
    }
}

async fn load_page(
    shared: Arc<CollectionShared>, generation: u64, query: ListQuery, token: PageToken,
) -> Result<CollectionState, SyncError> {
    let page_key = query.page_key(&token);
    let source = shared.source.clone();
    let page_fetcher = {
        let query = query.clone();
        let token = token.clone();
        fetcher(move || {
            let source = source.clone();
            let query = query.clone();
            let token = token.clone();
            async move { source.fetch_page(&query, &token).await.map(QueryData::Page) }
        })
    };

    // observed before the fetch so an invalidation landing mid-load triggers a refetch
    let result = match shared.cache.subscribe(&page_key, page_refresh_callback(&shared, generation)) {
        Ok(subscription) => shared
            .cache
            .fetch(&page_key, page_fetcher, &shared.options)
            .await
            .and_then(|data| data.as_page().cloned())
            .map(|page| (page, subscription)),
        Err(err) => Err(err),
    };

    let mut inner = shared.inner.lock();
    if inner.generation != generation {
        tracing::debug!(key = %page_key, "discarding page for a replaced filter");
        let state = inner.state.clone();
        drop(inner);
        // unsubscribing takes the cache lock
        drop(result);
        return Ok(state);
    }

    inner.pending = None;
    inner.state.is_loading = false;
    match result {
        Ok((page, subscription)) => {
            let page = refreshed_page(&shared.cache, &page_key).unwrap_or(page);
            tracing::debug!(key = %page_key, items = page.items.len(), has_next = page.has_next, "merged page");
            inner.append_page(page_key, &page);
            inner.subscriptions.push(subscription);
            shared.publish(&inner.state);
            Ok(inner.state.clone())
        }
        Err(err) if !err.is_user_facing() => {
            shared.publish(&inner.state);
            Ok(inner.state.clone())
        }
        Err(err) => {
            tracing::warn!(key = %page_key, error = %err, "page fetch failed, pagination stopped");
            inner.state.is_error = true;
            inner.state.error = Some(err.clone());
            shared.publish(&inner.state);
            Err(err)
        }
    }
}

/// Page data refetched after an invalidation that completed before the page was merged.
fn refreshed_page(cache: &QueryCache, key: &QueryKey) -> Option<Page> {
    let snapshot = cache.snapshot(key)?;
    if snapshot.status != Status::Success {
        return None;
    }
    snapshot.data.as_deref().and_then(|data| data.as_page().ok()).cloned()
}

/// Replace a page's items when its cache entry is refetched after an invalidation.
fn page_refresh_callback(shared: &Arc<CollectionShared>, generation: u64) -> crate::cache::Callback {
    let collection: Weak<CollectionShared> = Arc::downgrade(shared);
    Arc::new(move |snapshot: &EntrySnapshot| {
        if snapshot.status != Status::Success {
            return;
        }
        let Some(page) = snapshot.data.as_deref().and_then(|data| data.as_page().ok()) else {
            return;
        };
        let Some(shared) = collection.upgrade() else {
            return;
        };

        let mut inner = shared.inner.lock();
        if inner.generation != generation {
            return;
        }
        let Some(index) = inner.pages.iter().position(|slot| slot.key == snapshot.key) else {
            return;
        };

        inner.pages[index].items = page.items.clone();
        if index + 1 == inner.pages.len() {
            inner.state.has_next = page.has_next;
            inner.state.next_token = page.next_token();
        }
        inner.rebuild();
        tracing::debug!(key = %snapshot.key, len = inner.state.items.len(), "rebuilt collection after page refetch");
        shared.publish(&inner.state);
    })
}
