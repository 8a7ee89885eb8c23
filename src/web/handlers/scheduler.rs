//! Scheduler endpoints: manual generation trigger, SSE progress, status

use crate::errors::AppError;
use crate::scheduler::SchedulerStatus;
use crate::web::handlers::progress_sse_stream;
use crate::web::AppState;
use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::Json;
use std::time::Duration;

pub async fn status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

/// Manual run trigger. Rejected while a tick is already in progress; manual
/// runs complete or fail, they are never cancelled.
pub async fn generate(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    if state.scheduler.status().await.tick_in_progress {
        return Err(AppError::validation("a generation run is already in progress"));
    }
    state.scheduler.trigger_run();
    Ok(Json(serde_json::json!({ "started": true })))
}

pub async fn generate_stream(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>
{
    let receiver = state.progress.subscribe();
    Sse::new(progress_sse_stream(receiver)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
