//! Health check handler.

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let uptime = state
        .clock
        .now()
        .saturating_duration_since(state.started_at);

    Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": uptime.as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
