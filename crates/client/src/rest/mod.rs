//! REST implementation of the engine's data source.
//!
//! ### Endpoints
//!
//! - **Paginated read**: `GET /{resource}?page=&size=&keyword=&<filters>` returning
//!   `{items, page, size, total, total_pages, has_next}`
//! - **Typeahead**: `GET /search/?keyword=&storage_name=&page=&size=` returning
//!   an array of `{id, name|title}`
//! - **Mutations**: `POST|PUT|PATCH|DELETE /{resource}/{id?}` returning the
//!   entity or an empty body
//!
//! ### Status mapping
//!
//! - 400 and 422 on a mutation: `Validation` with the response body as message
//! - Any other non-2xx: `Http { status }`
//! - Client timeout: `Timeout`; other transport failures: `Network`
//! - Unexpected body shape: `Decode`

pub mod endpoints;
pub mod response;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use synq_core::{
    DataSource, Item, ListQuery, Method, Mutation, Page, PageToken, SearchHit, SearchQuery, SyncConfig, SyncError,
};

/// Longest validation message kept from a rejected mutation.
const MAX_VALIDATION_MESSAGE: usize = 512;

/// REST data source configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base URL every endpoint is appended to.
    pub base_url: String,
    /// User-agent string.
    pub user_agent: String,
    /// Client-level request timeout.
    pub timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            user_agent: "synq/0.1".to_string(),
            timeout: Duration::from_millis(20000),
        }
    }
}

impl From<&SyncConfig> for RestConfig {
    fn from(config: &SyncConfig) -> Self {
        Self { base_url: config.base_url.clone(), user_agent: config.user_agent.clone(), timeout: config.timeout() }
    }
}

/// HTTP client for the REST collaborator.
#[derive(Debug, Clone)]
pub struct RestSource {
    http: Client,
    base: url::Url,
    timeout: Duration,
}

impl RestSource {
    pub fn new(config: RestConfig) -> Result<Self, SyncError> {
        let base = endpoints::base_url(&config.base_url)?;
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, base, timeout: config.timeout })
    }

    pub fn base_url(&self) -> &url::Url {
        &self.base
    }

    /// Send `request`, returning the body of a 2xx response.
    async fn send(&self, request: reqwest::RequestBuilder, mutation: bool) -> Result<Bytes, SyncError> {
        let start = Instant::now();
        let response = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        tracing::debug!(
            url = %response.url(),
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "REST response"
        );

        if status.is_success() {
            return response.bytes().await.map_err(|e| self.transport_error(e));
        }

        if mutation && matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY) {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Validation(validation_message(status, &body)));
        }

        Err(SyncError::Http { status: status.as_u16() })
    }

    fn transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout.as_millis() as u64)
        } else if err.is_decode() {
            SyncError::Decode(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

fn validation_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("rejected with status {}", status.as_u16());
    }
    match body.char_indices().nth(MAX_VALIDATION_MESSAGE) {
        Some((end, _)) => body[..end].to_string(),
        None => body.to_string(),
    }
}

fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl DataSource for RestSource {
    async fn fetch_page(&self, query: &ListQuery, token: &PageToken) -> Result<Page, SyncError> {
        let url = endpoints::list_url(
            &self.base,
            &query.resource,
            token,
            query.page_size,
            query.keyword.as_deref(),
            &query.filters,
        );
        tracing::debug!(resource = %query.resource, url = %url, "fetching page");

        let body = self.send(self.http.get(url), false).await?;
        response::decode_page(&body, token)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SyncError> {
        let url = endpoints::search_url(&self.base, &query.storage, &query.keyword, query.size);
        tracing::debug!(storage = %query.storage, keyword = %query.keyword, "searching");

        let body = self.send(self.http.get(url), false).await?;
        response::decode_hits(&body)
    }

    async fn perform_mutation(&self, mutation: &Mutation) -> Result<Option<Item>, SyncError> {
        let id = mutation.id.as_ref().map(ToString::to_string);
        let segments: Vec<&str> = std::iter::once(mutation.resource.as_str()).chain(id.as_deref()).collect();
        let url = endpoints::endpoint(&self.base, &segments);
        tracing::info!(method = mutation.method.as_str(), url = %url, "sending mutation");

        let mut request = self.http.request(method(mutation.method), url);
        if let Some(body) = &mutation.body {
            request = request.json(body);
        }

        let body = self.send(request, true).await?;
        response::decode_entity(&body)
    }
}
