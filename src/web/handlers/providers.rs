//! Provider connection tests

use crate::web::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;

/// Probe each registered provider with a lightweight fetch and report
/// whether it responded.
pub async fn test_connections(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut results = Vec::new();
    let today = Utc::now().date_naive();

    for provider in state.registry.all() {
        let leagues = provider.get_supported_leagues();
        let probe_league = leagues.first().cloned();

        let (reachable, detail) = match &probe_league {
            Some(league) => {
                let events = provider.get_events(league, today).await;
                (
                    true,
                    format!("{} event(s) for {} today", events.len(), league),
                )
            }
            None => (false, "no leagues configured".to_string()),
        };

        results.push(serde_json::json!({
            "provider": provider.name(),
            "premium": provider.is_premium(),
            "configured_leagues": leagues.len(),
            "reachable": reachable,
            "detail": detail,
        }));
    }

    // Downstream probe: listing M3U accounts exercises auth and reachability
    let downstream = if state.dispatcharr.is_enabled() {
        let accounts = state.dispatcharr.list_m3u_accounts().await;
        serde_json::json!({
            "enabled": true,
            "reachable": accounts.success,
            "m3u_accounts": accounts.data.map(|a| a.len()).unwrap_or(0),
            "error": accounts.error,
        })
    } else {
        serde_json::json!({ "enabled": false })
    };

    Json(serde_json::json!({ "providers": results, "dispatcharr": downstream }))
}
