//! Subscriptions to cache entries.

use std::sync::{Arc, Weak};

use super::CacheInner;
use super::entry::EntrySnapshot;
use crate::key::QueryKey;

/// Called with a fresh snapshot on every state transition of the subscribed key.
pub type Callback = Arc<dyn Fn(&EntrySnapshot) + Send + Sync>;

/// Handle for an active subscription.
///
/// Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cache: Weak<CacheInner>,
    key: QueryKey,
    id: u64,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(cache: Weak<CacheInner>, key: QueryKey, id: u64) -> Self {
        Self { cache, key, id, active: true }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Unsubscribe explicitly. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(cache) = self.cache.upgrade() {
            super::unsubscribe(&cache, &self.key, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
