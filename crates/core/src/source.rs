//! The data-source capability the engine is built on.
//!
//! The engine never sees URLs, authentication or transport details; callers
//! supply an implementation of [`DataSource`] (see `synq-client` for the REST
//! one).

use async_trait::async_trait;

use crate::error::SyncError;
use crate::model::{Item, ListQuery, Mutation, Page, PageToken, SearchHit, SearchQuery};

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch one page of a paginated read.
    async fn fetch_page(&self, query: &ListQuery, token: &PageToken) -> Result<Page, SyncError>;

    /// Run a typeahead query.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SyncError>;

    /// Execute a write. Returns the created or updated entity, or `None` for an empty body.
    async fn perform_mutation(&self, mutation: &Mutation) -> Result<Option<Item>, SyncError>;
}
