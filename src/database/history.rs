//! Channel history audit log

use crate::models::ChannelHistoryEntry;
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

pub async fn log_channel_history(
    pool: &Pool<Sqlite>,
    managed_channel_id: Uuid,
    change_type: &str,
    change_source: &str,
    notes: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO managed_channel_history
            (managed_channel_id, change_type, change_source, notes)
         VALUES (?, ?, ?, ?)",
    )
    .bind(managed_channel_id)
    .bind(change_type)
    .bind(change_source)
    .bind(notes)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_channel_history(
    pool: &Pool<Sqlite>,
    managed_channel_id: Uuid,
    limit: i64,
) -> Result<Vec<ChannelHistoryEntry>> {
    Ok(sqlx::query_as(
        "SELECT * FROM managed_channel_history
         WHERE managed_channel_id = ?
         ORDER BY created_at DESC
         LIMIT ?",
    )
    .bind(managed_channel_id)
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

/// Delete history rows older than the retention window.
pub async fn cleanup_old_history(pool: &Pool<Sqlite>, retention_days: i64) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM managed_channel_history
         WHERE created_at < datetime('now', ?)",
    )
    .bind(format!("-{retention_days} days"))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
