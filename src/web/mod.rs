//! HTTP/REST surface
//!
//! Boundary only: thin axum handlers over the services. Reads return JSON,
//! progress streams are `text/event-stream` with heartbeat comments.

pub mod handlers;

use crate::config::Config;
use crate::database::Database;
use crate::dispatcharr::DispatcharrClient;
use crate::errors::AppError;
use crate::matching::patterns::DetectionKeywordService;
use crate::providers::ProviderRegistry;
use crate::scheduler::SchedulerHandle;
use crate::services::league_mappings::LeagueMappingService;
use crate::services::progress::ProgressBus;
use crate::services::team_cache::TeamCacheService;
use anyhow::Result;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub registry: ProviderRegistry,
    pub mappings: LeagueMappingService,
    pub team_cache: TeamCacheService,
    pub dispatcharr: DispatcharrClient,
    pub progress: ProgressBus,
    pub patterns: DetectionKeywordService,
    pub scheduler: SchedulerHandle,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Web(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub struct WebServer {
    host: String,
    port: u16,
    router: Router,
}

impl WebServer {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        config: Config,
        database: Database,
        registry: ProviderRegistry,
        mappings: LeagueMappingService,
        team_cache: TeamCacheService,
        dispatcharr: DispatcharrClient,
        progress: ProgressBus,
        patterns: DetectionKeywordService,
        scheduler: SchedulerHandle,
    ) -> Result<Self> {
        let state = AppState {
            database,
            registry,
            mappings,
            team_cache,
            dispatcharr,
            progress,
            patterns,
            scheduler,
        };

        let api = Router::new()
            .route("/groups", get(handlers::groups::list).post(handlers::groups::create))
            .route(
                "/groups/:id",
                get(handlers::groups::get_one)
                    .put(handlers::groups::update)
                    .delete(handlers::groups::delete),
            )
            .route(
                "/keywords",
                get(handlers::keywords::list).post(handlers::keywords::create),
            )
            .route(
                "/keywords/:id",
                put(handlers::keywords::update).delete(handlers::keywords::delete),
            )
            .route("/teams", get(handlers::teams::list).post(handlers::teams::create))
            .route("/teams/:id", axum::routing::delete(handlers::teams::delete))
            .route(
                "/settings/lifecycle",
                get(handlers::settings::get_lifecycle).put(handlers::settings::put_lifecycle),
            )
            .route(
                "/settings/epg",
                get(handlers::settings::get_epg).put(handlers::settings::put_epg),
            )
            .route(
                "/settings/scheduler",
                get(handlers::settings::get_scheduler).put(handlers::settings::put_scheduler),
            )
            .route(
                "/settings/reconciliation",
                get(handlers::settings::get_reconciliation)
                    .put(handlers::settings::put_reconciliation),
            )
            .route(
                "/settings/dispatcharr",
                get(handlers::settings::get_dispatcharr).put(handlers::settings::put_dispatcharr),
            )
            .route(
                "/settings/ordering",
                get(handlers::settings::list_ordering_rules)
                    .post(handlers::settings::create_ordering_rule),
            )
            .route(
                "/settings/ordering/:id",
                axum::routing::delete(handlers::settings::delete_ordering_rule),
            )
            .route(
                "/detection-keywords",
                get(handlers::detection::list).post(handlers::detection::create),
            )
            .route(
                "/detection-keywords/:id",
                axum::routing::delete(handlers::detection::delete),
            )
            .route(
                "/leagues",
                get(handlers::leagues::list).put(handlers::leagues::upsert),
            )
            .route(
                "/regular-tv",
                get(handlers::regular_tv::list).post(handlers::regular_tv::create),
            )
            .route(
                "/regular-tv/:id",
                axum::routing::delete(handlers::regular_tv::delete),
            )
            .route("/cache/status", get(handlers::cache::status))
            .route("/cache/leagues", get(handlers::cache::leagues))
            .route("/cache/refresh", post(handlers::cache::refresh))
            .route("/cache/refresh/stream", get(handlers::cache::refresh_stream))
            .route("/channels", get(handlers::channels::list))
            .route("/channels/:id/history", get(handlers::channels::history))
            .route("/channels/reconcile", post(handlers::channels::reconcile))
            .route("/generate", post(handlers::scheduler::generate))
            .route("/generate/stream", get(handlers::scheduler::generate_stream))
            .route("/scheduler/status", get(handlers::scheduler::status))
            .route("/providers/test", get(handlers::providers::test_connections))
            .route("/backup", get(handlers::backup::export))
            .route("/restore", post(handlers::backup::restore));

        let router = Router::new()
            .route("/health", get(health))
            .nest("/api/v1", api)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        Ok(Self {
            host: config.web.host,
            port: config.web.port,
            router,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn serve(self) -> Result<()> {
        let listener =
            tokio::net::TcpListener::bind(format!("{}:{}", self.host, self.port)).await?;
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
