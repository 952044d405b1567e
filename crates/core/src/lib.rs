//! Client-side data synchronization engine for synq.
//!
//! This crate provides:
//! - A process-wide query cache with request coalescing, stale-while-revalidate
//!   and prefix invalidation
//! - Infinite collections merging paginated reads into one deduplicated list
//! - Virtual windowing over long lists
//! - Debounced, out-of-order-safe typeahead search
//! - A mutation coordinator that invalidates after successful writes
//! - A persisted preference store
//! - Unified error types and layered configuration

pub mod cache;
pub mod collection;
pub mod config;
pub mod error;
pub mod key;
pub mod model;
pub mod mutation;
pub mod prefs;
pub mod search;
pub mod source;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheConfig, EntrySnapshot, FetchOptions, QueryCache, Status, Subscription};
pub use collection::{CollectionState, InfiniteCollection};
pub use config::{ConfigError, SyncConfig};
pub use error::SyncError;
pub use key::{KeySegment, QueryKey};
pub use model::{
    Invalidation, Item, ItemId, ListQuery, Method, Mutation, Page, PageToken, QueryData, Scope, SearchHit, SearchQuery,
};
pub use mutation::{MutationCoordinator, MutationOutcome};
pub use prefs::PreferenceStore;
pub use search::{SearchAhead, SearchOptions, SearchState};
pub use source::DataSource;
pub use window::{VirtualRange, VirtualWindow};
