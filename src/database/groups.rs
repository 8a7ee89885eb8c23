//! Event EPG group CRUD

use crate::models::{ChannelAssignmentMode, DuplicateMode, EventEpgGroup, GroupCreateRequest};
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

pub async fn create_group(pool: &Pool<Sqlite>, req: &GroupCreateRequest) -> Result<EventEpgGroup> {
    let id = Uuid::new_v4();
    let leagues = serde_json::to_string(&req.leagues)?;
    sqlx::query(
        r#"
        INSERT INTO event_epg_groups
            (id, name, m3u_account_id, m3u_group_id, leagues, parent_group_id,
             channel_assignment_mode, channel_start_number, sort_order, duplicate_mode)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&req.name)
    .bind(req.m3u_account_id)
    .bind(req.m3u_group_id)
    .bind(leagues)
    .bind(req.parent_group_id)
    .bind(req.channel_assignment_mode.unwrap_or(ChannelAssignmentMode::Manual))
    .bind(req.channel_start_number)
    .bind(req.sort_order.unwrap_or(0))
    .bind(req.duplicate_mode.unwrap_or(DuplicateMode::Consolidate))
    .execute(pool)
    .await?;

    get_group(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("group {id} vanished after insert"))
}

pub async fn get_group(pool: &Pool<Sqlite>, id: Uuid) -> Result<Option<EventEpgGroup>> {
    Ok(
        sqlx::query_as("SELECT * FROM event_epg_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?,
    )
}

/// All groups, enabled parents first by sort order, children after.
pub async fn list_groups(pool: &Pool<Sqlite>, include_disabled: bool) -> Result<Vec<EventEpgGroup>> {
    let query = if include_disabled {
        "SELECT * FROM event_epg_groups ORDER BY parent_group_id IS NOT NULL, sort_order, name"
    } else {
        "SELECT * FROM event_epg_groups WHERE enabled = 1
         ORDER BY parent_group_id IS NOT NULL, sort_order, name"
    };
    Ok(sqlx::query_as(query).fetch_all(pool).await?)
}

/// Enabled child groups of a parent.
pub async fn list_child_groups(pool: &Pool<Sqlite>, parent_id: Uuid) -> Result<Vec<EventEpgGroup>> {
    Ok(sqlx::query_as(
        "SELECT * FROM event_epg_groups
         WHERE parent_group_id = ? AND enabled = 1
         ORDER BY sort_order, name",
    )
    .bind(parent_id)
    .fetch_all(pool)
    .await?)
}

pub async fn update_group_stream_count(pool: &Pool<Sqlite>, id: Uuid, count: i64) -> Result<()> {
    sqlx::query(
        "UPDATE event_epg_groups
         SET total_stream_count = ?, updated_at = datetime('now')
         WHERE id = ?",
    )
    .bind(count)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_group_fields(
    pool: &Pool<Sqlite>,
    id: Uuid,
    fields: &serde_json::Map<String, serde_json::Value>,
) -> Result<bool> {
    const ALLOWED: &[&str] = &[
        "name",
        "m3u_account_id",
        "m3u_group_id",
        "leagues",
        "parent_group_id",
        "channel_assignment_mode",
        "channel_start_number",
        "sort_order",
        "duplicate_mode",
        "stream_include_regex",
        "stream_include_regex_enabled",
        "stream_exclude_regex",
        "stream_exclude_regex_enabled",
        "custom_teams_regex",
        "custom_teams_regex_enabled",
        "skip_builtin_extractor",
        "enabled",
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
    let sql =
        format!("UPDATE event_epg_groups SET {set_clause}, updated_at = datetime('now') WHERE id = ?");

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
    Ok(result.rows_affected() > 0)
}

pub async fn delete_group(pool: &Pool<Sqlite>, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM event_epg_groups WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
