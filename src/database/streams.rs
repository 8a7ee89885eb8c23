//! Managed channel stream CRUD
//!
//! Streams attach to channels with a priority (0 = highest). Within a
//! channel a downstream stream id appears at most once among non-removed
//! rows; removal is soft via `removed_at`.

use crate::models::{ManagedChannelStream, SourceGroupType};
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use tracing::debug;
use uuid::Uuid;

#[allow(clippy::too_many_arguments)]
pub async fn add_stream_to_channel(
    pool: &Pool<Sqlite>,
    managed_channel_id: Uuid,
    dispatcharr_stream_id: i64,
    stream_name: Option<&str>,
    priority: i64,
    source_group_id: Option<Uuid>,
    source_group_type: SourceGroupType,
    m3u_account_id: Option<i64>,
    m3u_account_name: Option<&str>,
    exception_keyword: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO managed_channel_streams
            (id, managed_channel_id, dispatcharr_stream_id, stream_name, priority,
             source_group_id, source_group_type, m3u_account_id, m3u_account_name,
             exception_keyword)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(managed_channel_id)
    .bind(dispatcharr_stream_id)
    .bind(stream_name)
    .bind(priority)
    .bind(source_group_id)
    .bind(source_group_type)
    .bind(m3u_account_id)
    .bind(m3u_account_name)
    .bind(exception_keyword)
    .execute(pool)
    .await?;

    debug!(
        "Attached stream {} to channel {} priority={}",
        dispatcharr_stream_id, managed_channel_id, priority
    );
    Ok(id)
}

pub async fn remove_stream_from_channel(
    pool: &Pool<Sqlite>,
    managed_channel_id: Uuid,
    dispatcharr_stream_id: i64,
    reason: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE managed_channel_streams
         SET removed_at = datetime('now'), remove_reason = ?
         WHERE managed_channel_id = ? AND dispatcharr_stream_id = ? AND removed_at IS NULL",
    )
    .bind(reason)
    .bind(managed_channel_id)
    .bind(dispatcharr_stream_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Active streams for a channel, ordered by (priority, added_at) so ties
/// break on attachment time.
pub async fn get_channel_streams(
    pool: &Pool<Sqlite>,
    managed_channel_id: Uuid,
) -> Result<Vec<ManagedChannelStream>> {
    Ok(sqlx::query_as(
        "SELECT * FROM managed_channel_streams
         WHERE managed_channel_id = ? AND removed_at IS NULL
         ORDER BY priority, added_at",
    )
    .bind(managed_channel_id)
    .fetch_all(pool)
    .await?)
}

pub async fn stream_exists_on_channel(
    pool: &Pool<Sqlite>,
    managed_channel_id: Uuid,
    dispatcharr_stream_id: i64,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM managed_channel_streams
         WHERE managed_channel_id = ? AND dispatcharr_stream_id = ? AND removed_at IS NULL",
    )
    .bind(managed_channel_id)
    .bind(dispatcharr_stream_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Next sequential priority for a channel (max + 1, or 0 when empty).
pub async fn get_next_stream_priority(
    pool: &Pool<Sqlite>,
    managed_channel_id: Uuid,
) -> Result<i64> {
    Ok(sqlx::query_scalar(
        "SELECT COALESCE(MAX(priority), -1) + 1 FROM managed_channel_streams
         WHERE managed_channel_id = ? AND removed_at IS NULL",
    )
    .bind(managed_channel_id)
    .fetch_one(pool)
    .await?)
}

pub async fn update_stream_priority(
    pool: &Pool<Sqlite>,
    stream_row_id: Uuid,
    new_priority: i64,
) -> Result<bool> {
    let result = sqlx::query("UPDATE managed_channel_streams SET priority = ? WHERE id = ?")
        .bind(new_priority)
        .bind(stream_row_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Downstream stream ids for a channel in priority order, for pushing the
/// ordered list to the channel manager.
pub async fn get_ordered_stream_ids(
    pool: &Pool<Sqlite>,
    managed_channel_id: Uuid,
) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT dispatcharr_stream_id FROM managed_channel_streams
         WHERE managed_channel_id = ? AND removed_at IS NULL
         ORDER BY priority, added_at",
    )
    .bind(managed_channel_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
