//! Data model shared by the cache, collections, search and mutations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::key::{KeySegment, QueryKey};

/// Identifier of a backend entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Int(i64),
    Str(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Int(i) => write!(f, "{i}"),
            ItemId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(i: i64) -> Self {
        ItemId::Int(i)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId::Str(s.to_string())
    }
}

impl From<&ItemId> for KeySegment {
    fn from(id: &ItemId) -> Self {
        match id {
            ItemId::Int(i) => KeySegment::Int(*i),
            ItemId::Str(s) => KeySegment::Str(s.clone()),
        }
    }
}

/// A backend entity: its id plus the remaining fields, kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Item {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self { id: id.into(), fields: serde_json::Map::new() }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }
}

/// Token identifying a page in a paginated sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageToken {
    /// 1-based page number.
    Number(u32),
    /// Opaque cursor handed out by the backend.
    Cursor(String),
}

impl PageToken {
    pub fn first() -> Self {
        PageToken::Number(1)
    }
}

impl From<&PageToken> for KeySegment {
    fn from(token: &PageToken) -> Self {
        match token {
            PageToken::Number(n) => KeySegment::Int(i64::from(*n)),
            PageToken::Cursor(c) => KeySegment::Str(c.clone()),
        }
    }
}

/// One page of a paginated read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub items: Vec<Item>,
    pub token: PageToken,
    pub has_next: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl Page {
    /// Token of the following page, if there is one.
    pub fn next_token(&self) -> Option<PageToken> {
        if !self.has_next {
            return None;
        }
        match (&self.token, &self.next_cursor) {
            (_, Some(cursor)) => Some(PageToken::Cursor(cursor.clone())),
            (PageToken::Number(n), None) => Some(PageToken::Number(n + 1)),
            (PageToken::Cursor(_), None) => None,
        }
    }
}

/// A typeahead hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ItemId,
    #[serde(alias = "name", alias = "title")]
    pub label: String,
}

/// Tagged result stored in the query cache, one variant per query type.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Page(Page),
    Hits(Vec<SearchHit>),
    Entity(Item),
}

impl QueryData {
    fn kind(&self) -> &'static str {
        match self {
            QueryData::Page(_) => "page",
            QueryData::Hits(_) => "hits",
            QueryData::Entity(_) => "entity",
        }
    }

    pub fn as_page(&self) -> Result<&Page, SyncError> {
        match self {
            QueryData::Page(page) => Ok(page),
            other => Err(SyncError::Decode(format!("expected page, cached {}", other.kind()))),
        }
    }

    pub fn as_hits(&self) -> Result<&[SearchHit], SyncError> {
        match self {
            QueryData::Hits(hits) => Ok(hits),
            other => Err(SyncError::Decode(format!("expected hits, cached {}", other.kind()))),
        }
    }

    pub fn as_entity(&self) -> Result<&Item, SyncError> {
        match self {
            QueryData::Entity(item) => Ok(item),
            other => Err(SyncError::Decode(format!("expected entity, cached {}", other.kind()))),
        }
    }
}

/// A paginated read: resource plus filter set.
///
/// Each distinct combination identifies one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    pub page_size: u32,
}

impl ListQuery {
    pub fn new(resource: impl Into<String>, page_size: u32) -> Self {
        Self { resource: resource.into(), keyword: None, filters: BTreeMap::new(), page_size }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }

    /// Prefix shared by every list and detail key of the resource.
    pub fn resource_key(&self) -> QueryKey {
        QueryKey::new([self.resource.as_str()])
    }

    /// Base key of the collection: `[resource, "list", serialized filter set]`.
    ///
    /// The filter set serializes with sorted keys, so insertion order does not matter.
    pub fn key(&self) -> QueryKey {
        let filters = serde_json::json!({
            "keyword": self.keyword,
            "filters": self.filters,
            "size": self.page_size,
        });
        self.resource_key().child("list").child(filters.to_string())
    }

    /// Key of a single page within the collection.
    pub fn page_key(&self, token: &PageToken) -> QueryKey {
        self.key().child(token)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.resource.trim().is_empty() {
            return Err(SyncError::InvalidInput("resource cannot be empty".into()));
        }
        if self.page_size == 0 {
            return Err(SyncError::InvalidInput("page size must be at least 1".into()));
        }
        Ok(())
    }
}

/// A typeahead query against one storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub storage: String,
    pub keyword: String,
    pub size: u32,
}

impl SearchQuery {
    pub fn key(&self) -> QueryKey {
        QueryKey::new(["search", self.storage.as_str(), self.keyword.as_str()]).child(self.size)
    }
}

/// Write method of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// How an invalidation key is matched against cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Exact,
    Prefix,
}

/// A request to mark cache entries stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub key: QueryKey,
    pub scope: Scope,
}

impl Invalidation {
    pub fn exact(key: QueryKey) -> Self {
        Self { key, scope: Scope::Exact }
    }

    pub fn prefix(key: QueryKey) -> Self {
        Self { key, scope: Scope::Prefix }
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        match self.scope {
            Scope::Exact => *key == self.key,
            Scope::Prefix => key.starts_with(&self.key),
        }
    }
}

/// Description of a write against the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub method: Method,
    pub resource: String,
    pub id: Option<ItemId>,
    pub body: Option<serde_json::Value>,
    /// Keys to invalidate after the write succeeds.
    pub invalidates: Vec<Invalidation>,
}

impl Mutation {
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        Self { method, resource: resource.into(), id: None, body: None, invalidates: Vec::new() }
    }

    pub fn with_id(mut self, id: impl Into<ItemId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn invalidating(mut self, invalidation: Invalidation) -> Self {
        self.invalidates.push(invalidation);
        self
    }

    /// Key of the single-entity detail query this mutation targets.
    pub fn detail_key(&self) -> Option<QueryKey> {
        self.id
            .as_ref()
            .map(|id| QueryKey::new([self.resource.as_str(), "detail"]).child(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_key;

    #[test]
    fn test_item_deserialize_keeps_fields() {
        let item: Item = serde_json::from_str(r#"{"id": 3, "name": "Chess club", "members": 12}"#).unwrap();
        assert_eq!(item.id, ItemId::Int(3));
        assert_eq!(item.fields["name"], "Chess club");
        assert_eq!(item.fields["members"], 12);
    }

    #[test]
    fn test_search_hit_label_aliases() {
        let by_name: SearchHit = serde_json::from_str(r#"{"id": 1, "name": "Hiking"}"#).unwrap();
        let by_title: SearchHit = serde_json::from_str(r#"{"id": "e-9", "title": "Meetup"}"#).unwrap();
        assert_eq!(by_name.label, "Hiking");
        assert_eq!(by_title.id, ItemId::Str("e-9".into()));
        assert_eq!(by_title.label, "Meetup");
    }

    #[test]
    fn test_next_token() {
        let page = Page { items: vec![], token: PageToken::Number(1), has_next: true, next_cursor: None, total: None };
        assert_eq!(page.next_token(), Some(PageToken::Number(2)));

        let last = Page { has_next: false, ..page.clone() };
        assert_eq!(last.next_token(), None);

        let cursor = Page { next_cursor: Some("abc".into()), ..page };
        assert_eq!(cursor.next_token(), Some(PageToken::Cursor("abc".into())));
    }

    #[test]
    fn test_query_data_variant_mismatch_is_decode_error() {
        let data = QueryData::Hits(vec![]);
        assert!(data.as_hits().is_ok());
        assert!(matches!(data.as_page(), Err(SyncError::Decode(_))));
        assert!(matches!(data.as_entity(), Err(SyncError::Decode(_))));
    }

    #[test]
    fn test_list_key_ignores_filter_insertion_order() {
        let a = ListQuery::new("events", 12).with_filter("city", "Oslo").with_filter("kind", "music");
        let b = ListQuery::new("events", 12).with_filter("kind", "music").with_filter("city", "Oslo");
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), ListQuery::new("events", 12).key());
        assert!(a.key().starts_with(&query_key!["events", "list"]));
    }

    #[test]
    fn test_page_key_extends_base() {
        let query = ListQuery::new("market", 12);
        let page_key = query.page_key(&PageToken::Number(2));
        assert!(page_key.starts_with(&query.key()));
        assert_eq!(page_key.len(), query.key().len() + 1);
    }

    #[test]
    fn test_list_query_validate() {
        assert!(ListQuery::new("posts", 12).validate().is_ok());
        assert!(matches!(ListQuery::new(" ", 12).validate(), Err(SyncError::InvalidInput(_))));
        assert!(matches!(ListQuery::new("posts", 0).validate(), Err(SyncError::InvalidInput(_))));
    }

    #[test]
    fn test_invalidation_scopes() {
        let exact = Invalidation::exact(query_key!["communities", "detail", 7i64]);
        assert!(exact.matches(&query_key!["communities", "detail", 7i64]));
        assert!(!exact.matches(&query_key!["communities", "detail", 7i64, "members"]));

        let prefix = Invalidation::prefix(query_key!["communities"]);
        assert!(prefix.matches(&query_key!["communities", "detail", 7i64, "members"]));
        assert!(!prefix.matches(&query_key!["events"]));
    }

    #[test]
    fn test_mutation_detail_key() {
        let mutation = Mutation::new(Method::Delete, "posts").with_id(42i64);
        assert_eq!(mutation.detail_key(), Some(query_key!["posts", "detail", 42i64]));
        assert_eq!(Mutation::new(Method::Post, "posts").detail_key(), None);
    }
}
