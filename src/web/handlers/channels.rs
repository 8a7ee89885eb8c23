//! Managed channel endpoints

use crate::database::{channels, settings as settings_db};
use crate::errors::AppError;
use crate::models::ManagedChannel;
use crate::services::reconciler::{ReconcileReport, Reconciler};
use crate::web::AppState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ManagedChannel>>, AppError> {
    let pool = state.database.pool();
    let channels = if query.include_deleted {
        sqlx::query_as("SELECT * FROM managed_channels ORDER BY event_epg_group_id, channel_number")
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?
    } else {
        channels::get_all_active_channels(pool)
            .await
            .map_err(|e| AppError::internal(e.to_string()))?
    };
    Ok(Json(channels))
}

pub async fn history(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<uuid::Uuid>,
) -> Result<Json<Vec<crate::models::ChannelHistoryEntry>>, AppError> {
    let entries = crate::database::history::get_channel_history(state.database.pool(), id, 100)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct ReconcileQuery {
    #[serde(default)]
    pub auto_fix: bool,
}

pub async fn reconcile(
    State(state): State<AppState>,
    Query(query): Query<ReconcileQuery>,
) -> Result<Json<ReconcileReport>, AppError> {
    let settings = settings_db::get_settings(state.database.pool())
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    let reconciler = Reconciler::new(state.database.clone(), state.dispatcharr.clone());
    let report = reconciler
        .reconcile(&settings.reconciliation, query.auto_fix)
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(report))
}
