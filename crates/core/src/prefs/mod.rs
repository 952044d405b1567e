//! Persisted key/value store for UI selections such as the last active tab.
//!
//! Backed by SQLite in WAL mode. Values are stored as JSON. This store is
//! independent of the query cache and never holds fetched data.

mod migrations;

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_rusqlite::{Connection, params, rusqlite};

use crate::error::SyncError;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Preference store handle.
///
/// Clones share one connection running on a background thread.
#[derive(Clone, Debug)]
pub struct PreferenceStore {
    conn: Connection,
}

impl PreferenceStore {
    /// Open the store at `path`, creating the file and schema if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .await
            .map_err(|e| SyncError::Storage(format!("cannot open {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "opened preference store");
        Self::init(conn).await
    }

    /// Open a throwaway in-memory store.
    pub async fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| SyncError::Storage(e.to_string()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, SyncError> {
        conn.call(|conn| conn.execute_batch(PRAGMAS)).await?;
        migrations::run(&conn).await?;
        Ok(Self { conn })
    }

    /// Stored value for `key`, or `None` if unset.
    ///
    /// A value that no longer deserializes as `T` is a `Decode` error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SyncError> {
        let key = key.to_string();
        let raw: Option<String> = self
            .conn
            .call(move |conn| -> Result<Option<String>, SyncError> {
                match conn.query_row("SELECT value FROM preferences WHERE key = ?1", params![key], |row| row.get(0)) {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        raw.map(|raw| serde_json::from_str(&raw)).transpose().map_err(SyncError::from)
    }

    /// Insert or replace the value for `key`.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SyncError> {
        validate_key(key)?;
        let key = key.to_string();
        let value = serde_json::to_string(value)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, chrono::Utc::now().to_rfc3339()],
                )
            })
            .await?;
        Ok(())
    }

    /// Remove `key`. Returns whether it was set.
    pub async fn remove(&self, key: &str) -> Result<bool, SyncError> {
        let key = key.to_string();
        let removed = self
            .conn
            .call(move |conn| conn.execute("DELETE FROM preferences WHERE key = ?1", params![key]))
            .await?;
        Ok(removed > 0)
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Result<Vec<String>, SyncError> {
        let keys = self
            .conn
            .call(|conn| -> Result<Vec<String>, SyncError> {
                let mut stmt = conn.prepare("SELECT key FROM preferences ORDER BY key")?;
                let keys = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await?;
        Ok(keys)
    }
}

fn validate_key(key: &str) -> Result<(), SyncError> {
    if key.trim().is_empty() {
        return Err(SyncError::InvalidInput("preference key cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = PreferenceStore::open_in_memory().await.unwrap();
        store.set("communities.tab", &"members").await.unwrap();

        let tab: Option<String> = store.get("communities.tab").await.unwrap();
        assert_eq!(tab.as_deref(), Some("members"));
        assert_eq!(store.get::<String>("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = PreferenceStore::open_in_memory().await.unwrap();
        store.set("market.page_size", &12u32).await.unwrap();
        store.set("market.page_size", &24u32).await.unwrap();

        assert_eq!(store.get::<u32>("market.page_size").await.unwrap(), Some(24));
        assert_eq!(store.keys().await.unwrap(), vec!["market.page_size".to_string()]);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = PreferenceStore::open_in_memory().await.unwrap();
        store.set("events.city", &"Oslo").await.unwrap();

        assert!(store.remove("events.city").await.unwrap());
        assert!(!store.remove("events.city").await.unwrap());
        assert_eq!(store.get::<String>("events.city").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_decode_error() {
        let store = PreferenceStore::open_in_memory().await.unwrap();
        store.set("tab", &"posts").await.unwrap();

        let err = store.get::<u32>("tab").await.unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = PreferenceStore::open_in_memory().await.unwrap();
        let err = store.set(" ", &1u8).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_values_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.sqlite");

        {
            let store = PreferenceStore::open(&path).await.unwrap();
            store.set("last_tab", &"events").await.unwrap();
        }

        let store = PreferenceStore::open(&path).await.unwrap();
        assert_eq!(store.get::<String>("last_tab").await.unwrap().as_deref(), Some("events"));
    }
}
