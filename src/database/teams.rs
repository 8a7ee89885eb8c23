//! Followed team CRUD (team-based EPG channels)

use crate::models::FollowedTeam;
use anyhow::Result;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

pub async fn list_teams(pool: &Pool<Sqlite>, enabled_only: bool) -> Result<Vec<FollowedTeam>> {
    let query = if enabled_only {
        "SELECT * FROM teams WHERE enabled = 1 ORDER BY name"
    } else {
        "SELECT * FROM teams ORDER BY name"
    };
    Ok(sqlx::query_as(query).fetch_all(pool).await?)
}

pub async fn get_team(pool: &Pool<Sqlite>, id: Uuid) -> Result<Option<FollowedTeam>> {
    Ok(sqlx::query_as("SELECT * FROM teams WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

#[allow(clippy::too_many_arguments)]
pub async fn create_team(
    pool: &Pool<Sqlite>,
    name: &str,
    provider: &str,
    provider_team_id: &str,
    league: &str,
    sport: &str,
    logo_url: Option<&str>,
) -> Result<FollowedTeam> {
    let id = Uuid::new_v4();
    let tvg_id = format!("matcharr.team.{}.{}", provider, provider_team_id);
    sqlx::query(
        "INSERT INTO teams (id, name, provider, provider_team_id, league, sport, logo_url, tvg_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(name)
    .bind(provider)
    .bind(provider_team_id)
    .bind(league)
    .bind(sport)
    .bind(logo_url)
    .bind(&tvg_id)
    .execute(pool)
    .await?;

    get_team(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("team {id} vanished after insert"))
}

pub async fn delete_team(pool: &Pool<Sqlite>, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM teams WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
