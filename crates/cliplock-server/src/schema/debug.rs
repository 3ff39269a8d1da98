//! Schema types for the debug endpoints.

use serde::{Deserialize, Serialize};

use cliplock_core::LockEvent;

#[derive(Debug, Clone, Deserialize)]
pub struct RecentLogsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentLogsResponse {
    pub count: usize,
    pub events: Vec<LockEvent>,
}
