//! Debug endpoints: recent in-memory events and log file statistics.

use axum::extract::{Query, State};
use axum::Json;

use crate::logfiles::LogStats;
use crate::schema::debug::{RecentLogsQuery, RecentLogsResponse};
use crate::state::AppState;

const DEFAULT_RECENT_LIMIT: usize = 50;

/// `GET /debug/logs/recent?limit=`
pub async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<RecentLogsQuery>,
) -> Json<RecentLogsResponse> {
    let limit = query
        .limit
        .filter(|&limit| limit > 0)
        .unwrap_or(DEFAULT_RECENT_LIMIT);
    let events = state.recorder.recent_events(limit);

    Json(RecentLogsResponse {
        count: events.len(),
        events,
    })
}

/// `GET /debug/logs/stats`
pub async fn log_stats(State(state): State<AppState>) -> Json<LogStats> {
    Json(state.log_files.stats())
}
