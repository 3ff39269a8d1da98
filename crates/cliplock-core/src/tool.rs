//! Registered automation tool state.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Liveness state of a tool, driven by heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Online,
    Offline,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Online => "online",
            ToolStatus::Offline => "offline",
        }
    }
}

/// A remote automation agent known to the registry.
///
/// Offline tools are retained so a re-registration after transient network
/// loss reactivates the same record instead of leaking a new one.
#[derive(Debug, Clone)]
pub struct Tool {
    pub tool_id: String,
    pub registered_at: Instant,
    pub last_heartbeat: Instant,
    pub status: ToolStatus,
}

impl Tool {
    pub fn new(tool_id: &str, now: Instant) -> Self {
        Tool {
            tool_id: tool_id.to_string(),
            registered_at: now,
            last_heartbeat: now,
            status: ToolStatus::Online,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ToolStatus::Online
    }

    /// Records a heartbeat, bringing the tool back online if needed.
    pub fn touch_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = now;
        self.status = ToolStatus::Online;
    }

    pub fn mark_offline(&mut self) {
        self.status = ToolStatus::Offline;
    }

    pub fn is_heartbeat_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat) > timeout
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::{Clock, ManualClock};

    #[test]
    fn heartbeat_expiry_and_reactivation() {
        let clock = Arc::new(ManualClock::new());
        let mut tool = Tool::new("tool-a", clock.now());
        assert!(tool.is_online());

        clock.advance(Duration::from_secs(301));
        assert!(tool.is_heartbeat_expired(clock.now(), Duration::from_secs(300)));

        tool.mark_offline();
        assert!(!tool.is_online());

        tool.touch_heartbeat(clock.now());
        assert!(tool.is_online());
        assert!(!tool.is_heartbeat_expired(clock.now(), Duration::from_secs(300)));
    }
}
