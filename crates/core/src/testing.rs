//! In-process data source for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::SyncError;
use crate::model::{Item, ItemId, ListQuery, Method, Mutation, Page, PageToken, SearchHit, SearchQuery};
use crate::source::DataSource;

/// Numbered items `1..=total`, paged by the query's page size, tagged with
/// the query's `city` filter so results of different filters can be told apart.
#[derive(Default)]
pub(crate) struct FakeSource {
    pub total: Mutex<u32>,
    /// Fixed ids per page number; overrides `total` when non-empty.
    pub scripted: Mutex<HashMap<u32, Vec<i64>>>,
    pub removed: Mutex<HashSet<i64>>,
    /// Page latency keyed by `city` filter value ("" when unfiltered).
    pub page_delays: Mutex<HashMap<String, Duration>>,
    /// Search latency keyed by keyword.
    pub search_delays: Mutex<HashMap<String, Duration>>,
    pub failing_pages: Mutex<HashSet<u32>>,
    pub mutation_error: Mutex<Option<SyncError>>,
    pub page_calls: AtomicU32,
    pub search_calls: AtomicU32,
    pub mutation_calls: AtomicU32,
}

impl FakeSource {
    pub fn with_total(total: u32) -> Self {
        Self { total: Mutex::new(total), ..Default::default() }
    }

    pub fn page_calls(&self) -> u32 {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> u32 {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn mutation_calls(&self) -> u32 {
        self.mutation_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn fetch_page(&self, query: &ListQuery, token: &PageToken) -> Result<Page, SyncError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let PageToken::Number(number) = token else {
            return Err(SyncError::Decode("fake source only pages by number".into()));
        };
        let number = *number;
        let city = query.filters.get("city").cloned().unwrap_or_default();

        let delay = self.page_delays.lock().get(&city).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_pages.lock().contains(&number) {
            return Err(SyncError::Http { status: 503 });
        }

        let (ids, has_next) = {
            let scripted = self.scripted.lock();
            if scripted.is_empty() {
                let total = *self.total.lock();
                let start = (number - 1) * query.page_size + 1;
                let end = (number * query.page_size).min(total);
                ((start..=end).map(i64::from).collect::<Vec<_>>(), end < total)
            } else {
                let ids = scripted.get(&number).cloned().unwrap_or_default();
                (ids, scripted.contains_key(&(number + 1)))
            }
        };

        let removed = self.removed.lock();
        let items = ids
            .into_iter()
            .filter(|id| !removed.contains(id))
            .map(|id| Item::new(id).with_field("city", city.as_str()))
            .collect();

        Ok(Page { items, token: token.clone(), has_next, next_cursor: None, total: None })
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SyncError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.search_delays.lock().get(&query.keyword).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok((0..25)
            .map(|i| SearchHit { id: ItemId::Int(i), label: format!("{}-{i}", query.keyword) })
            .collect())
    }

    async fn perform_mutation(&self, mutation: &Mutation) -> Result<Option<Item>, SyncError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.mutation_error.lock().clone() {
            return Err(err);
        }
        match (mutation.method, &mutation.id) {
            (Method::Delete, Some(ItemId::Int(id))) => {
                self.removed.lock().insert(*id);
                Ok(None)
            }
            (_, id) => Ok(Some(Item::new(id.clone().unwrap_or(ItemId::Int(999))).with_field("saved", true))),
        }
    }
}
