//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use synq_core::{
    DataSource, InfiniteCollection, Invalidation, ItemId, ListQuery, Method, Mutation, MutationCoordinator,
    PreferenceStore, QueryCache, QueryKey, SearchAhead, SearchOptions, SyncConfig, VirtualWindow,
};

use crate::cli::{MethodArg, PrefsAction};

/// Shared handles for one invocation.
pub struct Engine {
    pub config: SyncConfig,
    pub cache: QueryCache,
    pub source: Arc<dyn DataSource>,
}

/// Rows rendered beyond the viewport on each side.
const OVERSCAN: usize = 2;

pub async fn list(
    engine: &Engine, resource: String, keyword: Option<String>, filters: Vec<(String, String)>, size: Option<u32>,
    limit: usize, viewport: u64,
) -> Result<()> {
    let mut query = ListQuery::new(resource, size.unwrap_or(engine.config.page_size));
    if let Some(keyword) = keyword {
        query = query.with_keyword(keyword);
    }
    for (name, value) in filters {
        query = query.with_filter(name, value);
    }

    let collection =
        InfiniteCollection::new(engine.cache.clone(), engine.source.clone(), query, engine.config.fetch_options())?;
    // one row per item
    let mut window = VirtualWindow::new(Box::new(|_| 1), OVERSCAN);
    let mut state = collection.fetch_next().await?;
    let mut scroll = 0u64;
    let mut printed = 0usize;

    loop {
        window.set_len(state.len());
        let range = window.range(scroll, viewport);

        let end = range.end.min(limit);
        if end > printed {
            for item in &state.items[printed..end] {
                println!("{}", serde_json::to_string(item)?);
            }
            printed = end;
        }

        if printed >= limit || (!window.should_fetch_next(&range, state.has_next) && range.reaches_end(state.len())) {
            break;
        }

        let pages = state.pages_loaded;
        state = collection.fetch_for_range(&range).await?;
        if window.should_fetch_next(&range, state.has_next) && state.pages_loaded == pages {
            tracing::warn!(key = %state.key, "no progress loading the next page, stopping");
            break;
        }
        scroll += viewport;
    }

    tracing::info!(items = printed, pages = state.pages_loaded, has_next = state.has_next, "listing finished");
    Ok(())
}

pub async fn search(engine: &Engine, storage: String, text: &str, keystroke_ms: u64) -> Result<()> {
    let options = SearchOptions::from(&engine.config);
    let wait = options.debounce + engine.config.timeout() * engine.config.retry_attempts;
    let search = SearchAhead::new(engine.cache.clone(), engine.source.clone(), storage, options)?;
    let mut changes = search.subscribe();

    let mut sequence = search.on_input("");
    for (index, ch) in text.char_indices() {
        sequence = search.on_input(&text[..index + ch.len_utf8()]);
        tokio::time::sleep(std::time::Duration::from_millis(keystroke_ms)).await;
    }

    let state = tokio::time::timeout(wait, changes.wait_for(|state| state.sequence == sequence && !state.is_loading))
        .await
        .context("search did not settle in time")??
        .clone();

    if let Some(err) = state.error {
        bail!(err);
    }
    for hit in &state.hits {
        println!("{}", serde_json::to_string(hit)?);
    }
    Ok(())
}

pub async fn mutate(
    engine: &Engine, method: MethodArg, resource: String, id: Option<String>, body: Option<String>,
) -> Result<()> {
    let method = match method {
        MethodArg::Post => Method::Post,
        MethodArg::Put => Method::Put,
        MethodArg::Patch => Method::Patch,
        MethodArg::Delete => Method::Delete,
    };

    let prefix = QueryKey::new([resource.as_str()]);
    let mut mutation = Mutation::new(method, resource).invalidating(Invalidation::prefix(prefix));
    if let Some(id) = id {
        mutation = mutation.with_id(parse_id(&id));
    }
    if let Some(body) = body {
        mutation = mutation.with_body(serde_json::from_str(&body).context("--body must be valid JSON")?);
    }

    let coordinator = MutationCoordinator::new(engine.cache.clone(), engine.source.clone());
    let outcome = coordinator.perform(&mutation).await?;
    if let Err(err) = &outcome.invalidation {
        tracing::warn!(error = %err, "write succeeded but invalidation failed");
    }

    match outcome.item {
        Some(item) => println!("{}", serde_json::to_string_pretty(&item)?),
        None => println!("ok"),
    }
    Ok(())
}

pub async fn prefs(config: &SyncConfig, action: PrefsAction) -> Result<()> {
    let store = PreferenceStore::open(&config.prefs_path).await?;

    match action {
        PrefsAction::Get { key } => match store.get::<serde_json::Value>(&key).await? {
            Some(value) => println!("{value}"),
            None => bail!("preference `{key}` is not set"),
        },
        PrefsAction::Set { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            store.set(&key, &value).await?;
        }
        PrefsAction::Remove { key } => {
            if !store.remove(&key).await? {
                tracing::info!(key = %key, "preference was not set");
            }
        }
        PrefsAction::List => {
            for key in store.keys().await? {
                println!("{key}");
            }
        }
    }
    Ok(())
}

/// Numeric ids are sent as integers, anything else as a string.
fn parse_id(raw: &str) -> ItemId {
    raw.parse::<i64>().map(ItemId::Int).unwrap_or_else(|_| ItemId::Str(raw.to_string()))
}
