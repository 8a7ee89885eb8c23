//! Managed channel CRUD
//!
//! Soft-delete only: `deleted_at` is set and rows are never removed, so
//! soft-deleted channels coexist with new rows for the same event. The
//! duplicate-mode lookups implement the consolidate/separate/ignore routing.

use crate::models::{DuplicateMode, ManagedChannel};
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};
use uuid::Uuid;

/// Fields for a new managed channel beyond the identity columns.
#[derive(Debug, Clone, Default)]
pub struct NewChannelFields {
    pub channel_number: Option<i64>,
    pub logo_url: Option<String>,
    pub channel_group_id: Option<i64>,
    pub channel_profile_ids: Option<Vec<i64>>,
    pub primary_stream_id: Option<i64>,
    pub exception_keyword: Option<String>,
    pub card_segment: Option<String>,
    pub home_team: Option<String>,
    pub home_team_abbrev: Option<String>,
    pub home_team_logo: Option<String>,
    pub away_team: Option<String>,
    pub away_team_abbrev: Option<String>,
    pub away_team_logo: Option<String>,
    pub event_date: Option<String>,
    pub event_name: Option<String>,
    pub league: Option<String>,
    pub sport: Option<String>,
    pub venue: Option<String>,
    pub broadcast: Option<String>,
    pub scheduled_delete_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn create_managed_channel(
    pool: &Pool<Sqlite>,
    group_id: Uuid,
    event_id: &str,
    event_provider: &str,
    tvg_id: &str,
    channel_name: &str,
    fields: NewChannelFields,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let profile_ids = fields
        .channel_profile_ids
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO managed_channels
            (id, event_epg_group_id, event_id, event_provider, tvg_id, channel_name,
             channel_number, logo_url, channel_group_id, channel_profile_ids,
             primary_stream_id, exception_keyword, card_segment,
             home_team, home_team_abbrev, home_team_logo,
             away_team, away_team_abbrev, away_team_logo,
             event_date, event_name, league, sport, venue, broadcast,
             scheduled_delete_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(group_id)
    .bind(event_id)
    .bind(event_provider)
    .bind(tvg_id)
    .bind(channel_name)
    .bind(fields.channel_number)
    .bind(&fields.logo_url)
    .bind(fields.channel_group_id)
    .bind(profile_ids)
    .bind(fields.primary_stream_id)
    .bind(&fields.exception_keyword)
    .bind(&fields.card_segment)
    .bind(&fields.home_team)
    .bind(&fields.home_team_abbrev)
    .bind(&fields.home_team_logo)
    .bind(&fields.away_team)
    .bind(&fields.away_team_abbrev)
    .bind(&fields.away_team_logo)
    .bind(&fields.event_date)
    .bind(&fields.event_name)
    .bind(&fields.league)
    .bind(&fields.sport)
    .bind(&fields.venue)
    .bind(&fields.broadcast)
    .bind(fields.scheduled_delete_at)
    .execute(pool)
    .await?;

    info!(
        "Created managed channel {} name='{}' event={}",
        id, channel_name, event_id
    );
    Ok(id)
}

pub async fn get_managed_channel(pool: &Pool<Sqlite>, id: Uuid) -> Result<Option<ManagedChannel>> {
    Ok(
        sqlx::query_as("SELECT * FROM managed_channels WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn get_channels_for_group(
    pool: &Pool<Sqlite>,
    group_id: Uuid,
    include_deleted: bool,
) -> Result<Vec<ManagedChannel>> {
    let query = if include_deleted {
        "SELECT * FROM managed_channels WHERE event_epg_group_id = ? ORDER BY channel_number"
    } else {
        "SELECT * FROM managed_channels
         WHERE event_epg_group_id = ? AND deleted_at IS NULL
         ORDER BY channel_number"
    };
    Ok(sqlx::query_as(query).bind(group_id).fetch_all(pool).await?)
}

pub async fn get_all_active_channels(pool: &Pool<Sqlite>) -> Result<Vec<ManagedChannel>> {
    Ok(sqlx::query_as(
        "SELECT * FROM managed_channels
         WHERE deleted_at IS NULL
         ORDER BY event_epg_group_id, channel_number",
    )
    .fetch_all(pool)
    .await?)
}

/// Channels whose scheduled delete time has passed. The comparison happens
/// here rather than in SQL: stored timestamp text formats don't order
/// reliably against SQLite's own datetime strings.
pub async fn get_channels_pending_deletion(
    pool: &Pool<Sqlite>,
) -> Result<Vec<ManagedChannel>> {
    let candidates: Vec<ManagedChannel> = sqlx::query_as(
        "SELECT * FROM managed_channels
         WHERE scheduled_delete_at IS NOT NULL
           AND deleted_at IS NULL
         ORDER BY scheduled_delete_at",
    )
    .fetch_all(pool)
    .await?;

    let now = chrono::Utc::now();
    Ok(candidates
        .into_iter()
        .filter(|c| c.scheduled_delete_at.map(|at| now >= at).unwrap_or(false))
        .collect())
}

pub async fn update_managed_channel(
    pool: &Pool<Sqlite>,
    id: Uuid,
    fields: &serde_json::Map<String, serde_json::Value>,
) -> Result<bool> {
    const ALLOWED: &[&str] = &[
        "channel_name",
        "channel_number",
        "logo_url",
        "dispatcharr_channel_id",
        "dispatcharr_uuid",
        "dispatcharr_logo_id",
        "channel_group_id",
        "channel_profile_ids",
        "primary_stream_id",
        "scheduled_delete_at",
        "sync_status",
        "event_date",
        "event_name",
        "venue",
        "broadcast",
    ];

    let updates: Vec<(&String, &serde_json::Value)> = fields
        .iter()
        .filter(|(key, _)| ALLOWED.contains(&key.as_str()))
        .collect();
    if updates.is_empty() {
        return Ok(false);
    }

    let set_clause = updates
        .iter()
        .map(|(key, _)| format!("{key} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE managed_channels SET {set_clause} WHERE id = ?");

    let mut query = sqlx::query(&sql);
    for (_, value) in &updates {
        query = match value {
            serde_json::Value::Null => query.bind(None::<String>),
            serde_json::Value::Bool(b) => query.bind(*b),
            serde_json::Value::Number(n) if n.is_i64() => query.bind(n.as_i64()),
            serde_json::Value::Number(n) => query.bind(n.as_f64()),
            serde_json::Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        };
    }
    let result = query.bind(id).execute(pool).await?;
    if result.rows_affected() > 0 {
        debug!("Updated managed channel {}", id);
    }
    Ok(result.rows_affected() > 0)
}

pub async fn set_dispatcharr_ids(
    pool: &Pool<Sqlite>,
    id: Uuid,
    dispatcharr_channel_id: i64,
    dispatcharr_uuid: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE managed_channels
         SET dispatcharr_channel_id = ?, dispatcharr_uuid = ?, sync_status = 'synced'
         WHERE id = ?",
    )
    .bind(dispatcharr_channel_id)
    .bind(dispatcharr_uuid)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_sync_status(pool: &Pool<Sqlite>, id: Uuid, status: &str) -> Result<()> {
    sqlx::query("UPDATE managed_channels SET sync_status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Soft delete: sets deleted_at and a reason, never removes the row.
pub async fn mark_channel_deleted(
    pool: &Pool<Sqlite>,
    id: Uuid,
    reason: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE managed_channels
         SET deleted_at = datetime('now'), delete_reason = ?
         WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(reason)
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() > 0 {
        info!("Soft-deleted managed channel {} reason={:?}", id, reason);
    }
    Ok(result.rows_affected() > 0)
}

/// Find an existing active channel under the group's duplicate-handling mode.
///
/// - consolidate: one channel per (group, event, keyword); a null keyword is
///   distinct from any label
/// - separate: one channel per primary stream
/// - ignore: first stream wins, any channel for the event matches
pub async fn find_existing_channel(
    pool: &Pool<Sqlite>,
    group_id: Uuid,
    event_id: &str,
    event_provider: &str,
    mode: DuplicateMode,
    exception_keyword: Option<&str>,
    stream_id: Option<i64>,
    card_segment: Option<&str>,
) -> Result<Option<ManagedChannel>> {
    let base = "SELECT * FROM managed_channels
         WHERE event_epg_group_id = ? AND event_id = ? AND event_provider = ?
           AND deleted_at IS NULL";

    let channel: Option<ManagedChannel> = match mode {
        DuplicateMode::Separate => {
            let Some(stream_id) = stream_id else {
                return Ok(None);
            };
            sqlx::query_as(&format!("{base} AND primary_stream_id = ?"))
                .bind(group_id)
                .bind(event_id)
                .bind(event_provider)
                .bind(stream_id)
                .fetch_optional(pool)
                .await?
        }
        DuplicateMode::Ignore => sqlx::query_as(&format!("{base} LIMIT 1"))
            .bind(group_id)
            .bind(event_id)
            .bind(event_provider)
            .fetch_optional(pool)
            .await?,
        DuplicateMode::Consolidate => {
            let segment_clause = match card_segment {
                Some(_) => " AND card_segment = ?",
                None => " AND card_segment IS NULL",
            };
            let keyword_clause = match exception_keyword {
                Some(_) => " AND exception_keyword = ?",
                None => " AND exception_keyword IS NULL",
            };
            let sql = format!("{base}{segment_clause}{keyword_clause}");
            let mut query = sqlx::query_as(&sql)
                .bind(group_id)
                .bind(event_id)
                .bind(event_provider);
            if let Some(segment) = card_segment {
                query = query.bind(segment);
            }
            if let Some(keyword) = exception_keyword {
                query = query.bind(keyword);
            }
            query.fetch_optional(pool).await?
        }
    };

    Ok(channel)
}

/// A parent group's channel for an event, for child-group stream attachment.
/// Keyword-specific channels are matched exactly; a null keyword means the
/// main channel.
pub async fn find_parent_channel_for_event(
    pool: &Pool<Sqlite>,
    parent_group_id: Uuid,
    event_id: &str,
    event_provider: &str,
    exception_keyword: Option<&str>,
    card_segment: Option<&str>,
) -> Result<Option<ManagedChannel>> {
    let keyword_clause = match exception_keyword {
        Some(_) => "AND exception_keyword = ?",
        None => "AND (exception_keyword IS NULL OR exception_keyword = '')",
    };
    let segment_clause = match card_segment {
        Some(_) => "AND card_segment = ?",
        None => "AND card_segment IS NULL",
    };
    let sql = format!(
        "SELECT * FROM managed_channels
         WHERE event_epg_group_id = ? AND event_id = ? AND event_provider = ?
           {keyword_clause} {segment_clause} AND deleted_at IS NULL"
    );

    let mut query = sqlx::query_as(&sql)
        .bind(parent_group_id)
        .bind(event_id)
        .bind(event_provider);
    if let Some(keyword) = exception_keyword {
        query = query.bind(keyword);
    }
    if let Some(segment) = card_segment {
        query = query.bind(segment);
    }
    Ok(query.fetch_optional(pool).await?)
}

/// Duplicate groups: active channels sharing (group, event, keyword, segment),
/// oldest first within each set. Used by the reconciler.
pub async fn find_duplicate_channels(pool: &Pool<Sqlite>) -> Result<Vec<Vec<ManagedChannel>>> {
    let channels: Vec<ManagedChannel> = sqlx::query_as(
        "SELECT * FROM managed_channels
         WHERE deleted_at IS NULL
         ORDER BY event_epg_group_id, event_id, created_at",
    )
    .fetch_all(pool)
    .await?;

    let mut grouped: std::collections::HashMap<
        (Uuid, String, String, Option<String>, Option<String>),
        Vec<ManagedChannel>,
    > = std::collections::HashMap::new();
    for channel in channels {
        grouped
            .entry((
                channel.event_epg_group_id,
                channel.event_id.clone(),
                channel.event_provider.clone(),
                channel.exception_keyword.clone(),
                channel.card_segment.clone(),
            ))
            .or_default()
            .push(channel);
    }

    Ok(grouped.into_values().filter(|set| set.len() > 1).collect())
}
