//! Schema types for tool registration and liveness endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cliplock_core::{TicketId, ToolStatus};

use crate::config::ClientConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterToolRequest {
    pub tool_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterToolResponse {
    pub tool_id: String,
    pub status: String,
    pub config: ClientConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatRequest {
    pub tool_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub status: String,
    pub next_heartbeat_before: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnregisterRequest {
    pub tool_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnregisterResponse {
    pub status: String,
    /// Tickets removed by the offline cascade, queued or holding.
    pub released_tickets: Vec<TicketId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolStatusQuery {
    pub tool_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatusResponse {
    pub tool_id: String,
    pub status: ToolStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub next_heartbeat_deadline: DateTime<Utc>,
}
