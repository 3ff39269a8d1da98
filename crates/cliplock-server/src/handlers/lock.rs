//! Lock queue handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;

use cliplock_core::{settings, QueueStatus, TicketId, TicketStatus};

use crate::error::ApiError;
use crate::schema::lock::{
    CheckLockQuery, CheckLockResponse, ExtendLockRequest, ExtendLockResponse, LockRequest,
    LockRequestResponse, ReleaseLockRequest, ReleaseLockResponse,
};
use crate::state::AppState;

fn parse_ticket_id(raw: &str) -> Result<TicketId, ApiError> {
    // A malformed id can never name a ticket, so it reads as absent.
    TicketId::parse(raw).ok_or(ApiError::TicketNotFound)
}

/// `POST /lock/request`
pub async fn request_lock(
    State(state): State<AppState>,
    payload: Result<Json<LockRequest>, JsonRejection>,
) -> Result<Json<LockRequestResponse>, ApiError> {
    let Json(req) = payload.map_err(|_| {
        ApiError::InvalidRequest("tool_id and thread_id are required".to_string())
    })?;
    if req.tool_id.is_empty() || req.thread_id.is_empty() {
        return Err(ApiError::InvalidRequest(
            "tool_id and thread_id are required".to_string(),
        ));
    }

    let (ticket, position) = state
        .lock_manager
        .request_lock(&req.tool_id, &req.thread_id)?;
    let coordination = settings::snapshot(&state.settings);

    let mut response = LockRequestResponse {
        ticket_id: ticket.ticket_id,
        position,
        poll_interval: coordination.poll_interval,
        ticket_expires_at: state
            .clock
            .wall_time_of(ticket.requested_at + coordination.ticket_ttl()),
        status: None,
        expires_at: None,
        lock_duration_ms: None,
    };

    if position == 0 {
        response.status = Some(TicketStatus::Granted.as_str().to_string());
        response.expires_at = ticket.expires_at.map(|t| state.clock.wall_time_of(t));
        response.lock_duration_ms =
            Some(ticket.remaining(state.clock.now()).as_millis() as u64);
    }

    Ok(Json(response))
}

/// `GET /lock/check?ticket_id=`
pub async fn check_lock(
    State(state): State<AppState>,
    Query(query): Query<CheckLockQuery>,
) -> Result<Json<CheckLockResponse>, ApiError> {
    let raw = query
        .ticket_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            ApiError::InvalidRequest("ticket_id query parameter is required".to_string())
        })?;
    let ticket_id = parse_ticket_id(&raw)?;

    let (ticket, position) = state.lock_manager.check_lock(ticket_id)?;

    let mut response = CheckLockResponse {
        status: ticket.status.as_str().to_string(),
        position: None,
        estimated_wait_ms: None,
        expires_at: None,
        lock_duration_ms: None,
        reason: None,
    };

    match ticket.status {
        TicketStatus::Waiting => {
            response.position = position;
            if let Some(position) = position {
                response.estimated_wait_ms = Some(
                    state.lock_manager.estimate_wait(position).as_millis() as u64,
                );
            }
        }
        TicketStatus::Granted => {
            response.expires_at = ticket.expires_at.map(|t| state.clock.wall_time_of(t));
            response.lock_duration_ms =
                Some(ticket.remaining(state.clock.now()).as_millis() as u64);
        }
        TicketStatus::Expired => {
            response.reason = ticket.expire_reason.map(|r| r.as_str().to_string());
        }
        TicketStatus::Released => {}
    }

    Ok(Json(response))
}

/// `POST /lock/release`
pub async fn release_lock(
    State(state): State<AppState>,
    payload: Result<Json<ReleaseLockRequest>, JsonRejection>,
) -> Result<Json<ReleaseLockResponse>, ApiError> {
    let Json(req) =
        payload.map_err(|_| ApiError::InvalidRequest("ticket_id is required".to_string()))?;
    let ticket_id = parse_ticket_id(&req.ticket_id)?;

    let ticket = state.lock_manager.release_lock(ticket_id)?;

    Ok(Json(ReleaseLockResponse {
        status: "released".to_string(),
        held_duration_ms: ticket.hold_duration(state.clock.now()).as_millis() as u64,
    }))
}

/// `POST /lock/extend`
pub async fn extend_lock(
    State(state): State<AppState>,
    payload: Result<Json<ExtendLockRequest>, JsonRejection>,
) -> Result<Json<ExtendLockResponse>, ApiError> {
    let Json(req) =
        payload.map_err(|_| ApiError::InvalidRequest("ticket_id is required".to_string()))?;
    let ticket_id = parse_ticket_id(&req.ticket_id)?;

    let ticket = state.lock_manager.extend_lock(ticket_id)?;
    let coordination = settings::snapshot(&state.settings);

    let new_expires_at = ticket
        .expires_at
        .map(|t| state.clock.wall_time_of(t))
        .unwrap_or_else(|| state.clock.now_utc());

    Ok(Json(ExtendLockResponse {
        status: "extended".to_string(),
        new_expires_at,
        extend_count: ticket.extend_count,
        extend_remaining: coordination.lock_extend_max.saturating_sub(ticket.extend_count),
    }))
}

/// `GET /lock/status`
pub async fn lock_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.lock_manager.queue_status())
}
