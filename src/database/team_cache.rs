//! Team and league cache queries
//!
//! Read side of the C4 cache: which leagues contain a team name, team
//! lookups by provider id, and cache metadata. The write side (full-replace
//! refresh) lives in `services::team_cache`.

use crate::models::{CacheStats, LeagueEntry, TeamCacheEntry};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;

/// Leagues where both team names appear. The intersection is the candidate
/// set for matching; empty means at least one side is unknown.
pub async fn find_candidate_leagues(
    pool: &Pool<Sqlite>,
    team1: &str,
    team2: &str,
    sport: Option<&str>,
) -> Result<Vec<(String, String)>> {
    let leagues1 = get_leagues_for_team(pool, team1, sport).await?;
    if leagues1.is_empty() {
        return Ok(Vec::new());
    }
    let leagues2 = get_leagues_for_team(pool, team2, sport).await?;
    Ok(leagues1.intersection(&leagues2).cloned().collect())
}

/// All (league, provider) pairs a team name could belong to, by substring
/// match on name/short name or exact abbreviation.
async fn get_leagues_for_team(
    pool: &Pool<Sqlite>,
    team_name: &str,
    sport: Option<&str>,
) -> Result<HashSet<(String, String)>> {
    if team_name.trim().is_empty() {
        return Ok(HashSet::new());
    }

    let team_lower = team_name.to_lowercase().trim().to_string();
    let like = format!("%{team_lower}%");

    let rows: Vec<(String, String)> = if let Some(sport) = sport {
        sqlx::query_as(
            r#"
            SELECT DISTINCT league, provider FROM team_cache
            WHERE (LOWER(team_name) LIKE ?
                   OR LOWER(team_abbrev) = ?
                   OR LOWER(team_short_name) LIKE ?)
              AND sport = ?
            "#,
        )
        .bind(&like)
        .bind(&team_lower)
        .bind(&like)
        .bind(sport)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as(
            r#"
            SELECT DISTINCT league, provider FROM team_cache
            WHERE LOWER(team_name) LIKE ?
               OR LOWER(team_abbrev) = ?
               OR LOWER(team_short_name) LIKE ?
            "#,
        )
        .bind(&like)
        .bind(&team_lower)
        .bind(&like)
        .fetch_all(pool)
        .await?
    };

    Ok(rows.into_iter().collect())
}

/// All leagues a team plays in.
///
/// Provider team IDs are only unique within a sport (ESPN id 6 is two
/// different teams in MLB and NHL), so sport is required for correctness
/// whenever the caller has it.
pub async fn get_team_leagues(
    pool: &Pool<Sqlite>,
    provider_team_id: &str,
    provider: &str,
    sport: Option<&str>,
) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = if let Some(sport) = sport {
        sqlx::query_as(
            "SELECT DISTINCT league FROM team_cache
             WHERE provider_team_id = ? AND provider = ? AND sport = ?",
        )
        .bind(provider_team_id)
        .bind(provider)
        .bind(sport)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as(
            "SELECT DISTINCT league FROM team_cache
             WHERE provider_team_id = ? AND provider = ?",
        )
        .bind(provider_team_id)
        .bind(provider)
        .fetch_all(pool)
        .await?
    };
    Ok(rows.into_iter().map(|(league,)| league).collect())
}

/// Team name by provider id, cache only — never calls a provider.
pub async fn get_team_name_by_id(
    pool: &Pool<Sqlite>,
    provider_team_id: &str,
    league: &str,
    provider: &str,
) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT team_name FROM team_cache
         WHERE provider_team_id = ? AND league = ? AND provider = ?
         LIMIT 1",
    )
    .bind(provider_team_id)
    .bind(league)
    .bind(provider)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(name,)| name))
}

/// All cached teams for a league.
pub async fn get_league_teams(
    pool: &Pool<Sqlite>,
    league: &str,
    provider: &str,
) -> Result<Vec<TeamCacheEntry>> {
    Ok(sqlx::query_as(
        "SELECT provider, provider_team_id, league, team_name, team_abbrev,
                team_short_name, sport, logo_url
         FROM team_cache WHERE league = ? AND provider = ?",
    )
    .bind(league)
    .bind(provider)
    .fetch_all(pool)
    .await?)
}

/// All available leagues: configured (preferred) plus discovered.
pub async fn get_all_leagues(
    pool: &Pool<Sqlite>,
    sport: Option<&str>,
    import_enabled_only: bool,
) -> Result<Vec<LeagueEntry>> {
    let base = if import_enabled_only {
        r#"
        SELECT league_code AS league_slug, provider,
               display_name AS league_name, sport, logo_url,
               cached_team_count AS team_count, import_enabled, league_alias
        FROM leagues
        WHERE import_enabled = 1 AND enabled = 1
        "#
        .to_string()
    } else {
        r#"
        SELECT league_slug, provider, league_name, sport, logo_url,
               team_count, import_enabled, league_alias
        FROM (
            SELECT league_code AS league_slug, provider,
                   display_name AS league_name, sport, logo_url,
                   cached_team_count AS team_count, import_enabled,
                   league_alias, 1 AS priority
            FROM leagues
            WHERE enabled = 1

            UNION ALL

            SELECT lc.league_slug, lc.provider, lc.league_name, lc.sport,
                   lc.logo_url, lc.team_count, 0 AS import_enabled,
                   NULL AS league_alias, 2 AS priority
            FROM league_cache lc
            WHERE NOT EXISTS (
                SELECT 1 FROM leagues l WHERE l.league_code = lc.league_slug
            )
        )
        WHERE 1 = 1
        "#
        .to_string()
    };

    let query = match sport {
        Some(_) => format!("{base} AND sport = ? ORDER BY sport, league_name"),
        None => format!("{base} ORDER BY sport, league_name"),
    };

    let mut q = sqlx::query_as::<_, LeagueEntry>(&query);
    if let Some(sport) = sport {
        q = q.bind(sport);
    }
    Ok(q.fetch_all(pool).await?)
}

pub async fn is_cache_empty(pool: &Pool<Sqlite>) -> bool {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM team_cache")
        .fetch_one(pool)
        .await
        .map(|count| count == 0)
        .unwrap_or(true)
}

/// Cache status; staleness derived as now - last_full_refresh > 7 days.
pub async fn get_cache_stats(pool: &Pool<Sqlite>) -> Result<CacheStats> {
    let row: Option<(Option<String>, i64, i64, f64, bool, Option<String>)> = sqlx::query_as(
        "SELECT last_full_refresh, leagues_count, teams_count,
                refresh_duration_seconds, refresh_in_progress, last_error
         FROM cache_meta WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    let Some((last_refresh_raw, leagues_count, teams_count, duration, in_progress, last_error)) =
        row
    else {
        return Ok(CacheStats {
            last_refresh: None,
            leagues_count: 0,
            teams_count: 0,
            refresh_duration_seconds: 0.0,
            is_stale: true,
            refresh_in_progress: false,
            last_error: None,
        });
    };

    let last_refresh = last_refresh_raw
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let is_stale = match last_refresh {
        Some(dt) => (Utc::now() - dt).num_days() > 7,
        None => true,
    };

    Ok(CacheStats {
        last_refresh,
        leagues_count,
        teams_count,
        refresh_duration_seconds: duration,
        is_stale,
        refresh_in_progress: in_progress,
        last_error,
    })
}

pub async fn set_refresh_in_progress(pool: &Pool<Sqlite>, in_progress: bool) -> Result<()> {
    sqlx::query("UPDATE cache_meta SET refresh_in_progress = ? WHERE id = 1")
        .bind(in_progress)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_cache_meta(
    pool: &Pool<Sqlite>,
    leagues_count: i64,
    teams_count: i64,
    duration_seconds: f64,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE cache_meta
         SET last_full_refresh = ?, leagues_count = ?, teams_count = ?,
             refresh_duration_seconds = ?, last_error = ?
         WHERE id = 1",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(leagues_count)
    .bind(teams_count)
    .bind(duration_seconds)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}
