//! Followed team endpoints

use crate::database::teams;
use crate::errors::AppError;
use crate::models::FollowedTeam;
use crate::web::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<FollowedTeam>>, AppError> {
    let teams = teams::list_teams(state.database.pool(), false)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(teams))
}

#[derive(Debug, Deserialize)]
pub struct TeamCreateRequest {
    pub name: String,
    pub provider: String,
    pub provider_team_id: String,
    pub league: String,
    pub sport: String,
    pub logo_url: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<TeamCreateRequest>,
) -> Result<Json<FollowedTeam>, AppError> {
    // An empty name falls back to the cached roster entry; no provider call
    let name = if req.name.trim().is_empty() {
        crate::database::team_cache::get_team_name_by_id(
            state.database.pool(),
            &req.provider_team_id,
            &req.league,
            &req.provider,
        )
        .await
        .map_err(|e| AppError::internal(e.to_string()))?
        .ok_or_else(|| AppError::validation("team name is required and not in cache"))?
    } else {
        req.name.clone()
    };

    let team = teams::create_team(
        state.database.pool(),
        &name,
        &req.provider,
        &req.provider_team_id,
        &req.league,
        &req.sport,
        req.logo_url.as_deref(),
    )
    .await
    .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(team))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = teams::delete_team(state.database.pool(), id)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if !deleted {
        return Err(AppError::not_found("team", id.to_string()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
