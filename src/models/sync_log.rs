//! Sync log model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Maximum number of log entries to keep.
pub const MAX_LOG_ENTRIES: i64 = 200;

/// Outcome recorded for a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Partial,
    Error,
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Partial => write!(f, "partial"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Row of the `sync_log` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncLogEntry {
    pub id: i64,
    pub operation: String,
    pub status: String,
    pub project_id: Option<i64>,
    pub mr_id: Option<i64>,
    pub message: Option<String>,
    pub duration_ms: Option<i64>,
    pub timestamp: i64,
}

/// Fields for a new log entry.
#[derive(Debug, Clone)]
pub struct NewLogEntry<'a> {
    pub operation: &'a str,
    pub status: LogStatus,
    pub project_id: Option<i64>,
    pub mr_id: Option<i64>,
    pub message: Option<String>,
    pub duration_ms: Option<i64>,
}

/// Append an entry and prune the log down to [`MAX_LOG_ENTRIES`].
pub async fn insert_log(
    pool: &sqlx::SqlitePool,
    entry: &NewLogEntry<'_>,
    timestamp: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_log (operation, status, project_id, mr_id, message, duration_ms, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.operation)
    .bind(entry.status.to_string())
    .bind(entry.project_id)
    .bind(entry.mr_id)
    .bind(&entry.message)
    .bind(entry.duration_ms)
    .bind(timestamp)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM sync_log WHERE id NOT IN (
            SELECT id FROM sync_log ORDER BY timestamp DESC, id DESC LIMIT ?
        )
        "#,
    )
    .bind(MAX_LOG_ENTRIES)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the most recent log entries, newest first.
pub async fn get_sync_log(
    pool: &sqlx::SqlitePool,
    limit: i64,
) -> Result<Vec<SyncLogEntry>, sqlx::Error> {
    sqlx::query_as::<_, SyncLogEntry>(
        "SELECT id, operation, status, project_id, mr_id, message, duration_ms, timestamp
         FROM sync_log ORDER BY timestamp DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
