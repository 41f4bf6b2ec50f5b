//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - JSON API under `/api/v1/...`
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Play
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/next", get(http::http_get_next))
        .route("/api/v1/check", post(http::http_post_check))
        .route("/api/v1/help", post(http::http_post_help))
        .route("/api/v1/skip", post(http::http_post_skip))
        .route("/api/v1/stats", get(http::http_get_stats))
        // Session pools
        .route("/api/v1/session/pool", post(http::http_post_session_pool))
        .route("/api/v1/session/report", get(http::http_get_session_report))
        .route("/api/v1/session/restart", post(http::http_post_session_restart))
        .route("/api/v1/session/exit", post(http::http_post_session_exit))
        // Engine
        .route("/api/v1/solve", post(http::http_post_solve))
        .route("/api/v1/normalize", post(http::http_post_normalize))
        .route("/api/v1/score", post(http::http_post_score))
        .route("/api/v1/pools", get(http::http_get_pools))
        .route("/api/v1/admin/rebuild", post(http::http_post_rebuild))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
