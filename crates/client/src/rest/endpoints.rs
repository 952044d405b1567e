//! Endpoint URL construction for the REST data source.

use std::collections::BTreeMap;

use synq_core::{PageToken, SyncError};
use url::Url;

/// Canonicalize the configured base URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Remove query string and fragment
/// 4. Drop a trailing slash so endpoints can be appended as path segments
pub fn base_url(input: &str) -> Result<Url, SyncError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidInput("base URL cannot be empty".into()));
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut parsed = Url::parse(&url_str).map_err(|e| SyncError::InvalidInput(format!("invalid base URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(SyncError::InvalidInput(format!("unsupported scheme: {scheme}"))),
    }

    parsed.set_query(None);
    parsed.set_fragment(None);
    if let Ok(mut segments) = parsed.path_segments_mut() {
        segments.pop_if_empty();
    }
    Ok(parsed)
}

/// `base` with `segments` appended to its path.
pub fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// `GET /{resource}?page=&size=&keyword=&<filters>`
pub fn list_url(
    base: &Url, resource: &str, token: &PageToken, size: u32, keyword: Option<&str>, filters: &BTreeMap<String, String>,
) -> Url {
    let mut url = endpoint(base, &[resource]);
    {
        let mut query = url.query_pairs_mut();
        match token {
            PageToken::Number(page) => query.append_pair("page", &page.to_string()),
            PageToken::Cursor(cursor) => query.append_pair("cursor", cursor),
        };
        query.append_pair("size", &size.to_string());
        if let Some(keyword) = keyword.filter(|k| !k.is_empty()) {
            query.append_pair("keyword", keyword);
        }
        for (name, value) in filters {
            query.append_pair(name, value);
        }
    }
    url
}

/// `GET /search/?keyword=&storage_name=&page=1&size=`
pub fn search_url(base: &Url, storage: &str, keyword: &str, size: u32) -> Url {
    let mut url = endpoint(base, &["search", ""]);
    url.query_pairs_mut()
        .append_pair("keyword", keyword)
        .append_pair("storage_name", storage)
        .append_pair("page", "1")
        .append_pair("size", &size.to_string());
    url
}
