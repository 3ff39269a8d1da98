//! Typed lifecycle events and the observer / sink seams.
//!
//! The lock manager and tool registry publish events strictly after the
//! corresponding transition is committed; the recorder consumes them and
//! can never influence a lock decision. Persistence is delegated through
//! [`LogSink`], whose implementations must not block the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::TicketId;
use crate::ticket::Ticket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventKind {
    LockRequested,
    LockGranted,
    LockReleased,
    LockExtended,
    LockExpired,
    TicketExpired,
}

/// One lock lifecycle event, shaped for the `events/lock` jsonl stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: LockEventKind,
    pub ticket_id: TicketId,
    pub tool_id: String,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hold_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extend_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LockEvent {
    /// Base event for `ticket`; callers fill in the kind-specific fields.
    pub fn new(at: DateTime<Utc>, kind: LockEventKind, ticket: &Ticket) -> Self {
        LockEvent {
            timestamp: at,
            event_type: kind,
            ticket_id: ticket.ticket_id,
            tool_id: ticket.tool_id.clone(),
            thread_id: ticket.thread_id.clone(),
            queue_position: None,
            queue_length: None,
            wait_duration_ms: None,
            hold_duration_ms: None,
            extend_count: None,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventKind {
    ToolRegistered,
    ToolHeartbeat,
    ToolOffline,
    ToolUnregistered,
}

/// One tool lifecycle event, shaped for the `events/tool` jsonl stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: ToolEventKind,
    pub tool_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Narrow capability through which the engine reports transitions.
pub trait EventObserver: Send + Sync {
    fn lock_event(&self, event: LockEvent);
    fn tool_event(&self, event: ToolEvent);
}

/// Downstream persistence for events. Implementations enqueue and return;
/// I/O happens elsewhere. Dropping an entry under backpressure is
/// acceptable, losing a counter is not (counters live in the recorder).
pub trait LogSink: Send + Sync {
    fn lock_event(&self, event: &LockEvent);
    fn tool_event(&self, event: &ToolEvent);
}
