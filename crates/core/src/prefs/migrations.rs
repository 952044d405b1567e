//! Preference store schema migrations.
//!
//! Applied versions are recorded in a `_migrations` table; each run applies
//! only the versions above the highest recorded one.

use tokio_rusqlite::{Connection, params};

use crate::error::SyncError;

/// Migration list: (version, SQL), applied in order.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_preferences.sql"))];

/// Run any pending migrations.
pub async fn run(conn: &Connection) -> Result<(), SyncError> {
    conn.call(|conn| -> Result<(), SyncError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                conn.execute_batch(sql)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version, chrono::Utc::now().to_rfc3339()],
                )?;
                tracing::debug!(version, "applied preference store migration");
            }
        }

        Ok(())
    })
    .await?;
    Ok(())
}
