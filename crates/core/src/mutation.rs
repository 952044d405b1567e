//! Writes against the backend followed by cache invalidation.
//!
//! The cache is never updated from a mutation response. A successful write
//! invalidates the keys the caller declared, and observed entries refetch
//! through the normal path.

use std::sync::Arc;

use crate::cache::QueryCache;
use crate::error::SyncError;
use crate::model::{Invalidation, Item, Mutation};
use crate::source::DataSource;

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// Entity returned by the backend, if the response had a body.
    pub item: Option<Item>,
    /// Invalidations declared by the mutation, for [`MutationCoordinator::invalidate`].
    pub invalidations: Vec<Invalidation>,
    /// Number of matched cache entries, or why invalidation failed.
    ///
    /// A failure here does not mean the write failed; retry with
    /// [`MutationCoordinator::invalidate`] instead of repeating the mutation.
    pub invalidation: Result<usize, SyncError>,
}

#[derive(Clone)]
pub struct MutationCoordinator {
    cache: QueryCache,
    source: Arc<dyn DataSource>,
}

impl MutationCoordinator {
    pub fn new(cache: QueryCache, source: Arc<dyn DataSource>) -> Self {
        Self { cache, source }
    }

    /// Execute `mutation`, then invalidate its declared keys.
    ///
    /// On failure the error is returned as-is and the cache is left untouched.
    pub async fn perform(&self, mutation: &Mutation) -> Result<MutationOutcome, SyncError> {
        if mutation.resource.trim().is_empty() {
            return Err(SyncError::InvalidInput("mutation resource cannot be empty".into()));
        }

        let item = match self.source.perform_mutation(mutation).await {
            Ok(item) => item,
            Err(err) => {
                tracing::warn!(
                    method = mutation.method.as_str(),
                    resource = %mutation.resource,
                    error = %err,
                    "mutation failed, cache untouched"
                );
                return Err(err);
            }
        };

        tracing::info!(
            method = mutation.method.as_str(),
            resource = %mutation.resource,
            id = ?mutation.id,
            invalidations = mutation.invalidates.len(),
            "mutation succeeded"
        );

        let invalidation = self.invalidate(&mutation.invalidates);
        Ok(MutationOutcome { item, invalidations: mutation.invalidates.clone(), invalidation })
    }

    /// Invalidate `requests` without touching the backend.
    ///
    /// Idempotent. Returns the total number of matched entries.
    pub fn invalidate(&self, requests: &[Invalidation]) -> Result<usize, SyncError> {
        requests.iter().try_fold(0, |matched, request| Ok(matched + self.cache.invalidate(request)?))
    }
}

impl std::fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator").field("cache", &self.cache).finish()
    }
}
