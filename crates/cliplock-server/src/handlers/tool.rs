//! Tool registration and liveness handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;

use cliplock_core::settings;

use crate::error::ApiError;
use crate::schema::tool::{
    HeartbeatRequest, HeartbeatResponse, RegisterToolRequest, RegisterToolResponse,
    ToolStatusQuery, ToolStatusResponse, UnregisterRequest, UnregisterResponse,
};
use crate::state::AppState;

fn require_tool_id(tool_id: &str) -> Result<(), ApiError> {
    if tool_id.is_empty() {
        return Err(ApiError::InvalidRequest("tool_id is required".to_string()));
    }
    Ok(())
}

/// `POST /tool/register`
pub async fn register_tool(
    State(state): State<AppState>,
    payload: Result<Json<RegisterToolRequest>, JsonRejection>,
) -> Result<Json<RegisterToolResponse>, ApiError> {
    let Json(req) =
        payload.map_err(|_| ApiError::InvalidRequest("tool_id is required".to_string()))?;
    require_tool_id(&req.tool_id)?;

    let tool = state.registry.register(&req.tool_id)?;
    let coordination = settings::snapshot(&state.settings);

    Ok(Json(RegisterToolResponse {
        tool_id: tool.tool_id,
        status: "registered".to_string(),
        config: state.config.client_config(&coordination),
    }))
}

/// `POST /tool/heartbeat`
pub async fn heartbeat_tool(
    State(state): State<AppState>,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let Json(req) =
        payload.map_err(|_| ApiError::InvalidRequest("tool_id is required".to_string()))?;
    require_tool_id(&req.tool_id)?;

    state.registry.heartbeat(&req.tool_id)?;
    let deadline = state.registry.heartbeat_deadline(&req.tool_id)?;

    Ok(Json(HeartbeatResponse {
        status: "ok".to_string(),
        next_heartbeat_before: state.clock.wall_time_of(deadline),
    }))
}

/// `POST /tool/unregister`
///
/// Going offline removes every ticket the tool owns; the next waiter is
/// granted in the same pass.
pub async fn unregister_tool(
    State(state): State<AppState>,
    payload: Result<Json<UnregisterRequest>, JsonRejection>,
) -> Result<Json<UnregisterResponse>, ApiError> {
    let Json(req) =
        payload.map_err(|_| ApiError::InvalidRequest("tool_id is required".to_string()))?;
    require_tool_id(&req.tool_id)?;

    state.registry.unregister(&req.tool_id)?;
    let released = state.lock_manager.remove_tool_tickets(&req.tool_id);

    Ok(Json(UnregisterResponse {
        status: "unregistered".to_string(),
        released_tickets: released,
    }))
}

/// `GET /tool/status?tool_id=`
pub async fn tool_status(
    State(state): State<AppState>,
    Query(query): Query<ToolStatusQuery>,
) -> Result<Json<ToolStatusResponse>, ApiError> {
    let tool_id = query
        .tool_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            ApiError::InvalidRequest("tool_id query parameter is required".to_string())
        })?;

    let tool = state.registry.get(&tool_id).ok_or(ApiError::ToolNotFound)?;
    let deadline = state.registry.heartbeat_deadline(&tool_id)?;

    Ok(Json(ToolStatusResponse {
        tool_id: tool.tool_id,
        status: tool.status,
        registered_at: state.clock.wall_time_of(tool.registered_at),
        last_heartbeat: state.clock.wall_time_of(tool.last_heartbeat),
        next_heartbeat_deadline: state.clock.wall_time_of(deadline),
    }))
}
