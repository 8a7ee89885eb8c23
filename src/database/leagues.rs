//! League mapping table CRUD

use crate::models::LeagueMapping;
use anyhow::Result;
use sqlx::{Pool, Sqlite};

pub async fn list_leagues(pool: &Pool<Sqlite>, enabled_only: bool) -> Result<Vec<LeagueMapping>> {
    let query = if enabled_only {
        "SELECT * FROM leagues WHERE enabled = 1 ORDER BY provider, league_code"
    } else {
        "SELECT * FROM leagues ORDER BY provider, league_code"
    };
    Ok(sqlx::query_as(query).fetch_all(pool).await?)
}

pub async fn get_league(
    pool: &Pool<Sqlite>,
    league_code: &str,
    provider: &str,
) -> Result<Option<LeagueMapping>> {
    Ok(
        sqlx::query_as("SELECT * FROM leagues WHERE league_code = ? AND provider = ?")
            .bind(league_code)
            .bind(provider)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn upsert_league(pool: &Pool<Sqlite>, mapping: &LeagueMapping) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO leagues
            (league_code, provider, provider_league_id, provider_league_name, sport,
             display_name, logo_url, league_alias, league_id, fallback_provider,
             fallback_league_id, import_enabled, enabled, cached_team_count)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (league_code, provider) DO UPDATE SET
            provider_league_id = excluded.provider_league_id,
            provider_league_name = excluded.provider_league_name,
            sport = excluded.sport,
            display_name = excluded.display_name,
            logo_url = excluded.logo_url,
            league_alias = excluded.league_alias,
            league_id = excluded.league_id,
            fallback_provider = excluded.fallback_provider,
            fallback_league_id = excluded.fallback_league_id,
            import_enabled = excluded.import_enabled,
            enabled = excluded.enabled,
            cached_team_count = excluded.cached_team_count
        "#,
    )
    .bind(&mapping.league_code)
    .bind(&mapping.provider)
    .bind(&mapping.provider_league_id)
    .bind(&mapping.provider_league_name)
    .bind(&mapping.sport)
    .bind(&mapping.display_name)
    .bind(&mapping.logo_url)
    .bind(&mapping.league_alias)
    .bind(&mapping.league_id)
    .bind(&mapping.fallback_provider)
    .bind(&mapping.fallback_league_id)
    .bind(mapping.import_enabled)
    .bind(mapping.enabled)
    .bind(mapping.cached_team_count)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_cached_team_count(
    pool: &Pool<Sqlite>,
    league_code: &str,
    provider: &str,
    count: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE leagues SET cached_team_count = ? WHERE league_code = ? AND provider = ?",
    )
    .bind(count)
    .bind(league_code)
    .bind(provider)
    .execute(pool)
    .await?;
    Ok(())
}
