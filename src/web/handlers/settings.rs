//! Settings endpoints
//!
//! Each section gets a GET/PUT pair; stream-ordering rules are rows rather
//! than a blob so they get list/create/delete.

use crate::database::settings as settings_db;
use crate::errors::AppError;
use crate::models::settings::{
    DispatcharrSettings, EpgSettings, LifecycleSettings, ReconciliationSettings,
    SchedulerSettings,
};
use crate::models::{OrderingRuleType, StreamOrderingRule};
use crate::web::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

macro_rules! section_handlers {
    ($get_name:ident, $put_name:ident, $ty:ty, $field:ident, $update:ident) => {
        pub async fn $get_name(State(state): State<AppState>) -> Result<Json<$ty>, AppError> {
            let settings = settings_db::get_settings(state.database.pool())
                .await
                .map_err(|e| AppError::internal(e.to_string()))?;
            Ok(Json(settings.$field))
        }

        pub async fn $put_name(
            State(state): State<AppState>,
            Json(section): Json<$ty>,
        ) -> Result<Json<$ty>, AppError> {
            settings_db::$update(state.database.pool(), &section)
                .await
                .map_err(|e| AppError::internal(e.to_string()))?;
            Ok(Json(section))
        }
    };
}

section_handlers!(
    get_lifecycle,
    put_lifecycle,
    LifecycleSettings,
    lifecycle,
    update_lifecycle_settings
);
section_handlers!(get_epg, put_epg, EpgSettings, epg, update_epg_settings);
section_handlers!(
    get_scheduler,
    put_scheduler,
    SchedulerSettings,
    scheduler,
    update_scheduler_settings
);
section_handlers!(
    get_reconciliation,
    put_reconciliation,
    ReconciliationSettings,
    reconciliation,
    update_reconciliation_settings
);
section_handlers!(
    get_dispatcharr,
    put_dispatcharr,
    DispatcharrSettings,
    dispatcharr,
    update_dispatcharr_settings
);

#[derive(Debug, Deserialize)]
pub struct OrderingRuleRequest {
    pub rule_type: OrderingRuleType,
    pub value: String,
    pub priority: i64,
}

pub async fn list_ordering_rules(
    State(state): State<AppState>,
) -> Result<Json<Vec<StreamOrderingRule>>, AppError> {
    let rules: Vec<StreamOrderingRule> =
        sqlx::query_as("SELECT * FROM channel_sort_priorities ORDER BY priority")
            .fetch_all(state.database.pool())
            .await
            .map_err(AppError::Database)?;
    Ok(Json(rules))
}

pub async fn create_ordering_rule(
    State(state): State<AppState>,
    Json(req): Json<OrderingRuleRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !(1..=99).contains(&req.priority) {
        return Err(AppError::validation("priority must be between 1 and 99"));
    }
    if matches!(req.rule_type, OrderingRuleType::Regex) {
        if let Err(e) = regex::Regex::new(&req.value) {
            return Err(AppError::validation(format!("invalid pattern: {e}")));
        }
    }

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO channel_sort_priorities (id, rule_type, value, priority) VALUES (?, ?, ?, ?)",
    )
    .bind(id)
    .bind(req.rule_type)
    .bind(&req.value)
    .bind(req.priority)
    .execute(state.database.pool())
    .await
    .map_err(AppError::Database)?;

    Ok(Json(serde_json::json!({ "id": id })))
}

pub async fn delete_ordering_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = sqlx::query("DELETE FROM channel_sort_priorities WHERE id = ?")
        .bind(id)
        .execute(state.database.pool())
        .await
        .map_err(AppError::Database)?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("ordering rule", id.to_string()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
