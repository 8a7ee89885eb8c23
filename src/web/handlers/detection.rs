//! Detection keyword endpoints
//!
//! User-editable classifier pattern overrides. Any change rebuilds the live
//! pattern set immediately; the orchestrator also re-reads them each tick.

use crate::database::keywords;
use crate::errors::AppError;
use crate::web::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, FromRow)]
pub struct DetectionKeywordView {
    pub id: Uuid,
    pub category: String,
    pub pattern: String,
    pub value: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct DetectionKeywordRequest {
    pub category: String,
    pub pattern: String,
    pub value: Option<String>,
}

const VALID_CATEGORIES: &[&str] = &[
    "combat_keyword",
    "league_hint",
    "sport_hint",
    "placeholder",
    "card_segment",
    "combat_exclusion",
];

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<DetectionKeywordView>>, AppError> {
    let rows: Vec<DetectionKeywordView> = sqlx::query_as(
        "SELECT id, category, pattern, value, enabled FROM detection_keywords
         ORDER BY category, pattern",
    )
    .fetch_all(state.database.pool())
    .await
    .map_err(AppError::Database)?;
    Ok(Json(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<DetectionKeywordRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !VALID_CATEGORIES.contains(&req.category.as_str()) {
        return Err(AppError::validation(format!(
            "unknown category '{}'",
            req.category
        )));
    }
    if let Err(e) = regex::Regex::new(&req.pattern) {
        return Err(AppError::validation(format!("invalid pattern: {e}")));
    }

    let id = keywords::create_detection_keyword(
        state.database.pool(),
        &req.category,
        &req.pattern,
        req.value.as_deref(),
    )
    .await
    .map_err(|e| AppError::internal(e.to_string()))?;

    invalidate_patterns(&state).await?;
    Ok(Json(serde_json::json!({ "id": id })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = keywords::delete_detection_keyword(state.database.pool(), id)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if !deleted {
        return Err(AppError::not_found("detection keyword", id.to_string()));
    }

    invalidate_patterns(&state).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn invalidate_patterns(state: &AppState) -> Result<(), AppError> {
    let overrides = keywords::list_detection_keywords(state.database.pool())
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    state.patterns.invalidate(&overrides);
    Ok(())
}
