//! Schema types for the lock queue endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cliplock_core::TicketId;

#[derive(Debug, Clone, Deserialize)]
pub struct LockRequest {
    pub tool_id: String,
    pub thread_id: String,
}

/// Response to a lock request. The `status`/`expires_at`/`lock_duration_ms`
/// trio is present only when the ticket was granted immediately
/// (position 0).
#[derive(Debug, Clone, Serialize)]
pub struct LockRequestResponse {
    pub ticket_id: TicketId,
    pub position: usize,
    /// Suggested poll interval, milliseconds.
    pub poll_interval: u64,
    pub ticket_expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckLockQuery {
    pub ticket_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckLockResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseLockRequest {
    pub ticket_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseLockResponse {
    pub status: String,
    pub held_duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendLockRequest {
    pub ticket_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtendLockResponse {
    pub status: String,
    pub new_expires_at: DateTime<Utc>,
    pub extend_count: u32,
    pub extend_remaining: u32,
}
