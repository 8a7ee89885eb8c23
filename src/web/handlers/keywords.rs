//! Consolidation exception keyword endpoints

use crate::database::keywords;
use crate::errors::AppError;
use crate::models::{ExceptionKeyword, KeywordCreateRequest};
use crate::web::AppState;
use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ExceptionKeyword>>, AppError> {
    let keywords = keywords::list_exception_keywords(state.database.pool(), false)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(keywords))
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<KeywordCreateRequest>,
) -> Result<Json<ExceptionKeyword>, AppError> {
    if req.label.trim().is_empty() || req.match_terms.trim().is_empty() {
        return Err(AppError::validation("label and match_terms are required"));
    }
    let keyword = keywords::create_exception_keyword(state.database.pool(), &req)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(keyword))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<KeywordCreateRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = keywords::update_exception_keyword(state.database.pool(), id, &req)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if !updated {
        return Err(AppError::not_found("keyword", id.to_string()));
    }
    Ok(Json(serde_json::json!({ "updated": true })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = keywords::delete_exception_keyword(state.database.pool(), id)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if !deleted {
        return Err(AppError::not_found("keyword", id.to_string()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
