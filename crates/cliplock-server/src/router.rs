//! Router assembly.
//!
//! [`build_router`] wires every handler to its route, attaches the
//! request-logging middleware (it also feeds the request counters, so it
//! is always on; persistence is gated inside the sink) and a `TraceLayer`
//! for request-level tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::request_logger;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        // Tool lifecycle
        .route("/tool/register", post(handlers::tool::register_tool))
        .route("/tool/heartbeat", post(handlers::tool::heartbeat_tool))
        .route("/tool/unregister", post(handlers::tool::unregister_tool))
        .route("/tool/status", get(handlers::tool::tool_status))
        // Lock queue
        .route("/lock/request", post(handlers::lock::request_lock))
        .route("/lock/check", get(handlers::lock::check_lock))
        .route("/lock/release", post(handlers::lock::release_lock))
        .route("/lock/extend", post(handlers::lock::extend_lock))
        .route("/lock/status", get(handlers::lock::lock_status))
        // Config
        .route(
            "/config",
            get(handlers::config::get_config).patch(handlers::config::update_config),
        )
        // Debug
        .route("/debug/logs/recent", get(handlers::debug::recent_logs))
        .route("/debug/logs/stats", get(handlers::debug::log_stats))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            request_logger,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
