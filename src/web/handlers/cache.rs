//! Team/league cache endpoints: status, refresh trigger, SSE progress

use crate::errors::AppError;
use crate::models::CacheStats;
use crate::web::handlers::progress_sse_stream;
use crate::web::AppState;
use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::Json;
use std::time::Duration;

pub async fn status(State(state): State<AppState>) -> Result<Json<CacheStats>, AppError> {
    let stats = state
        .team_cache
        .stats()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(stats))
}

/// All known leagues: configured mappings first, discovered leagues after.
pub async fn leagues(
    State(state): State<AppState>,
) -> Result<Json<Vec<crate::models::LeagueEntry>>, AppError> {
    let leagues =
        crate::database::team_cache::get_all_leagues(state.database.pool(), None, false)
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(leagues))
}

/// Kick off a cache refresh in the background; progress flows through the
/// SSE endpoint. A refresh already in flight rejects the trigger.
pub async fn refresh(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let stats = state
        .team_cache
        .stats()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    if stats.refresh_in_progress {
        return Err(AppError::validation("cache refresh already in progress"));
    }

    let team_cache = state.team_cache.clone();
    let progress = state.progress.clone();
    tokio::spawn(async move {
        progress.start("cache_refresh");
        let reporter = {
            let progress = progress.clone();
            move |message: &str, percent: i64| {
                progress.update("cache_refresh", message, percent);
            }
        };
        match team_cache.refresh(reporter).await {
            Ok(outcome) if outcome.success => {
                progress.complete(&format!(
                    "Cached {} teams across {} leagues",
                    outcome.teams_count, outcome.leagues_count
                ));
            }
            Ok(outcome) => {
                progress.fail(outcome.error.as_deref().unwrap_or("refresh failed"));
            }
            Err(e) => progress.fail(&e.to_string()),
        }
    });

    Ok(Json(serde_json::json!({ "started": true })))
}

pub async fn refresh_stream(
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
