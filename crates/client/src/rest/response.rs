//! REST response shapes and normalization into the engine's data model.

use bytes::Bytes;
use serde::Deserialize;
use synq_core::{Item, Page, PageToken, SearchHit, SyncError};

/// Raw paginated list response.
#[derive(Debug, Deserialize)]
pub struct ListEnvelope {
    pub items: Vec<Item>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default, alias = "hasNext")]
    pub has_next: Option<bool>,
    #[serde(default, alias = "nextCursor")]
    pub next_cursor: Option<String>,
}

impl ListEnvelope {
    /// Normalize into a [`Page`] for the requested `token`.
    ///
    /// `has_next` falls back to `page < total_pages`, then to the presence
    /// of a next cursor.
    pub fn into_page(self, token: &PageToken) -> Page {
        let has_next = match (self.has_next, self.page, self.total_pages) {
            (Some(has_next), _, _) => has_next,
            (None, Some(page), Some(total_pages)) => page < total_pages,
            (None, None, Some(total_pages)) => match token {
                PageToken::Number(page) => *page < total_pages,
                PageToken::Cursor(_) => self.next_cursor.is_some(),
            },
            _ => self.next_cursor.is_some(),
        };

        Page { items: self.items, token: token.clone(), has_next, next_cursor: self.next_cursor, total: self.total }
    }
}

/// Typeahead response: a bare array, or wrapped like a list page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchBody {
    Hits(Vec<SearchHit>),
    Envelope { items: Vec<SearchHit> },
}

pub fn decode_page(bytes: &Bytes, token: &PageToken) -> Result<Page, SyncError> {
    let envelope: ListEnvelope = serde_json::from_slice(bytes)?;
    Ok(envelope.into_page(token))
}

pub fn decode_hits(bytes: &Bytes) -> Result<Vec<SearchHit>, SyncError> {
    match serde_json::from_slice(bytes)? {
        SearchBody::Hits(hits) | SearchBody::Envelope { items: hits } => Ok(hits),
    }
}

/// Mutation response: the entity, or `None` for an empty body.
pub fn decode_entity(bytes: &Bytes) -> Result<Option<Item>, SyncError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice::<serde_json::Value>(bytes)? {
        serde_json::Value::Null => Ok(None),
        value => Ok(Some(serde_json::from_value(value)?)),
    }
}
