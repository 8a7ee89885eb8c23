//! League mapping endpoints
//!
//! Upserting a mapping reloads the in-memory league index so providers see
//! the change without a restart.

use crate::database::leagues;
use crate::errors::AppError;
use crate::models::LeagueMapping;
use crate::web::AppState;
use axum::extract::State;
use axum::Json;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<LeagueMapping>>, AppError> {
    let mappings = leagues::list_leagues(state.database.pool(), false)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(mappings))
}

pub async fn upsert(
    State(state): State<AppState>,
    Json(mapping): Json<LeagueMapping>,
) -> Result<Json<LeagueMapping>, AppError> {
    if mapping.league_code.trim().is_empty() || mapping.provider.trim().is_empty() {
        return Err(AppError::validation("league_code and provider are required"));
    }
    if mapping.sport.trim().is_empty() {
        return Err(AppError::validation("sport is required"));
    }

    leagues::upsert_league(state.database.pool(), &mapping)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    state
        .mappings
        .reload()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    Ok(Json(mapping))
}
