//! Tool registry: per-agent liveness tracked via heartbeats.
//!
//! Backed by a `DashMap` since `is_online` reads dominate (one per lock
//! request plus every heartbeat). Offline tools are retained and may be
//! reactivated by a later registration.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::clock::Clock;
use crate::events::{EventObserver, ToolEvent, ToolEventKind};
use crate::settings::{snapshot, SharedSettings};
use crate::tool::Tool;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool already registered and online")]
    AlreadyRegistered,

    #[error("tool not found")]
    NotFound,
}

pub struct ToolRegistry {
    tools: DashMap<String, Tool>,
    settings: SharedSettings,
    observer: Arc<dyn EventObserver>,
    clock: Arc<dyn Clock>,
}

impl ToolRegistry {
    pub fn new(
        settings: SharedSettings,
        observer: Arc<dyn EventObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ToolRegistry {
            tools: DashMap::new(),
            settings,
            observer,
            clock,
        }
    }

    /// Registers a new tool, or reactivates an offline one.
    ///
    /// Fails with [`RegistryError::AlreadyRegistered`] when the tool is
    /// present and online; re-registering after a transient network loss
    /// is the supported recovery path for clients.
    pub fn register(&self, tool_id: &str) -> Result<Tool, RegistryError> {
        let now = self.clock.now();

        let registered = match self.tools.entry(tool_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let tool = occupied.get_mut();
                if tool.is_online() {
                    tracing::debug!(tool_id, "tool already registered and online");
                    return Err(RegistryError::AlreadyRegistered);
                }
                tool.touch_heartbeat(now);
                tracing::info!(tool_id, "tool reactivated");
                tool.clone()
            }
            Entry::Vacant(vacant) => {
                let tool = Tool::new(tool_id, now);
                vacant.insert(tool.clone());
                tracing::info!(tool_id, "tool registered");
                tool
            }
        };

        self.publish(ToolEventKind::ToolRegistered, tool_id, None);
        Ok(registered)
    }

    /// Records a heartbeat, marking the tool online.
    pub fn heartbeat(&self, tool_id: &str) -> Result<Tool, RegistryError> {
        let now = self.clock.now();

        let tool = {
            let mut tool = self
                .tools
                .get_mut(tool_id)
                .ok_or(RegistryError::NotFound)?;
            tool.touch_heartbeat(now);
            tool.clone()
        };

        tracing::debug!(tool_id, "heartbeat updated");
        self.publish(ToolEventKind::ToolHeartbeat, tool_id, None);
        Ok(tool)
    }

    /// Marks the tool offline. The record is retained for reactivation.
    pub fn unregister(&self, tool_id: &str) -> Result<Tool, RegistryError> {
        let tool = {
            let mut tool = self
                .tools
                .get_mut(tool_id)
                .ok_or(RegistryError::NotFound)?;
            tool.mark_offline();
            tool.clone()
        };

        tracing::info!(tool_id, "tool unregistered");
        self.publish(ToolEventKind::ToolUnregistered, tool_id, None);
        Ok(tool)
    }

    pub fn get(&self, tool_id: &str) -> Option<Tool> {
        self.tools.get(tool_id).map(|tool| tool.clone())
    }

    pub fn is_online(&self, tool_id: &str) -> bool {
        self.tools
            .get(tool_id)
            .map(|tool| tool.is_online())
            .unwrap_or(false)
    }

    pub fn online_count(&self) -> usize {
        self.tools.iter().filter(|tool| tool.is_online()).count()
    }

    /// The instant by which the tool must heartbeat to stay online.
    pub fn heartbeat_deadline(&self, tool_id: &str) -> Result<Instant, RegistryError> {
        let timeout = snapshot(&self.settings).heartbeat_timeout();
        let tool = self.tools.get(tool_id).ok_or(RegistryError::NotFound)?;
        Ok(tool.last_heartbeat + timeout)
    }

    /// Marks every online tool whose heartbeat lapsed as offline and
    /// returns the affected ids. Callers cascade ticket removal.
    pub fn sweep_offline(&self) -> Vec<String> {
        let now = self.clock.now();
        let timeout = snapshot(&self.settings).heartbeat_timeout();

        let mut lapsed = Vec::new();
        for mut entry in self.tools.iter_mut() {
            if entry.is_online() && entry.is_heartbeat_expired(now, timeout) {
                entry.mark_offline();
                lapsed.push(entry.tool_id.clone());
            }
        }

        for tool_id in &lapsed {
            tracing::warn!(tool_id, "tool marked offline: heartbeat timeout");
            self.publish(
                ToolEventKind::ToolOffline,
                tool_id,
                Some("heartbeat_timeout".to_string()),
            );
        }

        lapsed
    }

    fn publish(&self, kind: ToolEventKind, tool_id: &str, reason: Option<String>) {
        self.observer.tool_event(ToolEvent {
            timestamp: self.clock.now_utc(),
            event_type: kind,
            tool_id: tool_id.to_string(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::events::LockEvent;
    use crate::settings::{self, CoordinationSettings};
    use crate::tool::ToolStatus;

    struct NullObserver;

    impl EventObserver for NullObserver {
        fn lock_event(&self, _event: LockEvent) {}
        fn tool_event(&self, _event: ToolEvent) {}
    }

    fn registry() -> (Arc<ManualClock>, ToolRegistry) {
        let clock = Arc::new(ManualClock::new());
        let registry = ToolRegistry::new(
            settings::shared(CoordinationSettings::default()),
            Arc::new(NullObserver),
            clock.clone(),
        );
        (clock, registry)
    }

    #[test]
    fn register_then_duplicate_fails() {
        let (_clock, registry) = registry();
        registry.register("tool-a").unwrap();
        assert!(matches!(
            registry.register("tool-a"),
            Err(RegistryError::AlreadyRegistered)
        ));
    }

    #[test]
    fn unregister_retains_record_and_register_reactivates() {
        let (_clock, registry) = registry();
        registry.register("tool-a").unwrap();
        registry.unregister("tool-a").unwrap();
        assert!(!registry.is_online("tool-a"));
        assert_eq!(registry.get("tool-a").map(|t| t.status), Some(ToolStatus::Offline));

        let tool = registry.register("tool-a").unwrap();
        assert!(tool.is_online());
    }

    #[test]
    fn heartbeat_for_unknown_tool_fails() {
        let (_clock, registry) = registry();
        assert!(matches!(
            registry.heartbeat("ghost"),
            Err(RegistryError::NotFound)
        ));
    }

    #[test]
    fn sweep_marks_lapsed_tools_offline() {
        let (clock, registry) = registry();
        registry.register("tool-a").unwrap();
        registry.register("tool-b").unwrap();

        clock.advance(Duration::from_secs(200));
        registry.heartbeat("tool-b").unwrap();

        clock.advance(Duration::from_secs(101));
        let lapsed = registry.sweep_offline();
        assert_eq!(lapsed, vec!["tool-a".to_string()]);
        assert!(!registry.is_online("tool-a"));
        assert!(registry.is_online("tool-b"));
        assert_eq!(registry.online_count(), 1);
    }

    #[test]
    fn heartbeat_deadline_tracks_last_heartbeat() {
        let (clock, registry) = registry();
        registry.register("tool-a").unwrap();
        let first = registry.heartbeat_deadline("tool-a").unwrap();

        clock.advance(Duration::from_secs(60));
        registry.heartbeat("tool-a").unwrap();
        let second = registry.heartbeat_deadline("tool-a").unwrap();
        assert_eq!(second - first, Duration::from_secs(60));
    }
}
