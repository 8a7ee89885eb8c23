//! Regular (non-event) TV group endpoints

use crate::errors::AppError;
use crate::models::RegularTvGroup;
use crate::web::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<RegularTvGroup>>, AppError> {
    let groups: Vec<RegularTvGroup> =
        sqlx::query_as("SELECT * FROM regular_tv_groups ORDER BY name")
            .fetch_all(state.database.pool())
            .await
            .map_err(AppError::Database)?;
    Ok(Json(groups))
}

#[derive(Debug, Deserialize)]
pub struct RegularTvGroupRequest {
    pub name: String,
    pub m3u_account_id: Option<i64>,
    pub m3u_group_id: Option<i64>,
    pub channel_start_number: Option<i64>,
    pub channel_group_id: Option<i64>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<RegularTvGroupRequest>,
) -> Result<Json<RegularTvGroup>, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::validation("group name is required"));
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO regular_tv_groups
            (id, name, m3u_account_id, m3u_group_id, channel_start_number, channel_group_id)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&req.name)
    .bind(req.m3u_account_id)
    .bind(req.m3u_group_id)
    .bind(req.channel_start_number)
    .bind(req.channel_group_id)
    .execute(state.database.pool())
    .await
    .map_err(AppError::Database)?;

    let group: RegularTvGroup = sqlx::query_as("SELECT * FROM regular_tv_groups WHERE id = ?")
        .bind(id)
        .fetch_one(state.database.pool())
        .await
        .map_err(AppError::Database)?;
    Ok(Json(group))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = sqlx::query("DELETE FROM regular_tv_groups WHERE id = ?")
        .bind(id)
        .execute(state.database.pool())
        .await
        .map_err(AppError::Database)?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("regular TV group", id.to_string()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
