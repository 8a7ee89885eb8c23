//! Event EPG group endpoints

use crate::database::groups;
use crate::errors::AppError;
use crate::models::{EventEpgGroup, GroupCreateRequest};
use crate::web::AppState;
use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<EventEpgGroup>>, AppError> {
    let groups = groups::list_groups(state.database.pool(), true)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(groups))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EventEpgGroup>, AppError> {
    groups::get_group(state.database.pool(), id)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?
        .map(Json)
        .ok_or_else(|| AppError::not_found("group", id.to_string()))
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<GroupCreateRequest>,
) -> Result<Json<EventEpgGroup>, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::validation("group name is required"));
    }
    let group = groups::create_group(state.database.pool(), &req)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(group))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(fields): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<Json<EventEpgGroup>, AppError> {
    groups::update_group_fields(state.database.pool(), id, &fields)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    groups::get_group(state.database.pool(), id)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?
        .map(Json)
        .ok_or_else(|| AppError::not_found("group", id.to_string()))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = groups::delete_group(state.database.pool(), id)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if !deleted {
        return Err(AppError::not_found("group", id.to_string()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
