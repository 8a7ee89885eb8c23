//! Configuration backup and restore
//!
//! Exports the user-authored configuration (groups, keywords, teams,
//! ordering rules, settings sections) as one JSON document. Restore is
//! additive-by-replace for the exported tables; managed channels and caches
//! are engine state and deliberately not part of the backup.

use crate::errors::AppError;
use crate::models::{EventEpgGroup, ExceptionKeyword, FollowedTeam, StreamOrderingRule};
use crate::web::AppState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupDocument {
    pub version: i64,
    pub groups: Vec<EventEpgGroup>,
    pub keywords: Vec<ExceptionKeyword>,
    pub teams: Vec<FollowedTeam>,
    pub ordering_rules: Vec<StreamOrderingRule>,
    pub settings: serde_json::Value,
}

pub async fn export(State(state): State<AppState>) -> Result<Json<BackupDocument>, AppError> {
    let pool = state.database.pool();

    let groups = crate::database::groups::list_groups(pool, true)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    let keywords = crate::database::keywords::list_exception_keywords(pool, false)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    let teams = crate::database::teams::list_teams(pool, false)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    let ordering_rules: Vec<StreamOrderingRule> =
        sqlx::query_as("SELECT * FROM channel_sort_priorities ORDER BY priority")
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;
    let settings = crate::database::settings::get_settings(pool)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    Ok(Json(BackupDocument {
        version: settings.schema_version,
        groups,
        keywords,
        teams,
        ordering_rules,
        settings: serde_json::to_value(&settings).map_err(|e| AppError::internal(e.to_string()))?,
    }))
}

pub async fn restore(
    State(state): State<AppState>,
    Json(document): Json<BackupDocument>,
) -> Result<Json<serde_json::Value>, AppError> {
    let pool = state.database.pool();

    let mut tx = pool.begin().await.map_err(AppError::Database)?;
    sqlx::query("DELETE FROM event_epg_groups")
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;
    sqlx::query("DELETE FROM consolidation_exception_keywords")
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;
    sqlx::query("DELETE FROM teams")
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;
    sqlx::query("DELETE FROM channel_sort_priorities")
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

    for group in &document.groups {
        sqlx::query(
            r#"
            INSERT INTO event_epg_groups
                (id, name, m3u_account_id, m3u_group_id, leagues, parent_group_id,
                 channel_assignment_mode, channel_start_number, total_stream_count,
                 sort_order, duplicate_mode, stream_include_regex,
                 stream_include_regex_enabled, stream_exclude_regex,
                 stream_exclude_regex_enabled, custom_teams_regex,
                 custom_teams_regex_enabled, skip_builtin_extractor, enabled)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.m3u_account_id)
        .bind(group.m3u_group_id)
        .bind(&group.leagues)
        .bind(group.parent_group_id)
        .bind(group.channel_assignment_mode)
        .bind(group.channel_start_number)
        .bind(group.total_stream_count)
        .bind(group.sort_order)
        .bind(group.duplicate_mode)
        .bind(&group.stream_include_regex)
        .bind(group.stream_include_regex_enabled)
        .bind(&group.stream_exclude_regex)
        .bind(group.stream_exclude_regex_enabled)
        .bind(&group.custom_teams_regex)
        .bind(group.custom_teams_regex_enabled)
        .bind(group.skip_builtin_extractor)
        .bind(group.enabled)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;
    }

    for keyword in &document.keywords {
        sqlx::query(
            "INSERT INTO consolidation_exception_keywords (id, label, match_terms, behavior, enabled)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(keyword.id)
        .bind(&keyword.label)
        .bind(&keyword.match_terms)
        .bind(keyword.behavior)
        .bind(keyword.enabled)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;
    }

    for team in &document.teams {
        sqlx::query(
            "INSERT INTO teams (id, name, provider, provider_team_id, league, sport, logo_url, tvg_id, enabled)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(team.id)
        .bind(&team.name)
        .bind(&team.provider)
        .bind(&team.provider_team_id)
        .bind(&team.league)
        .bind(&team.sport)
        .bind(&team.logo_url)
        .bind(&team.tvg_id)
        .bind(team.enabled)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;
    }

    for rule in &document.ordering_rules {
        sqlx::query(
            "INSERT INTO channel_sort_priorities (id, rule_type, value, priority, enabled)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(rule.id)
        .bind(rule.rule_type)
        .bind(&rule.value)
        .bind(rule.priority)
        .bind(rule.enabled)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;
    }

    tx.commit().await.map_err(AppError::Database)?;

    Ok(Json(serde_json::json!({
        "restored": {
            "groups": document.groups.len(),
            "keywords": document.keywords.len(),
            "teams": document.teams.len(),
            "ordering_rules": document.ordering_rules.len(),
        }
    })))
}
