//! Identifier newtypes for the coordination engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque ticket identifier handed to clients.
///
/// 128 bits of randomness rendered as an ASCII token; clients must not
/// assume any structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub Uuid);

impl TicketId {
    pub fn generate() -> Self {
        TicketId(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(TicketId)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unit of queueing: one logical worker thread within a tool.
///
/// At most one live ticket may exist per key at any moment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub tool_id: String,
    pub thread_id: String,
}

impl ThreadKey {
    pub fn new(tool_id: &str, thread_id: &str) -> Self {
        ThreadKey {
            tool_id: tool_id.to_string(),
            thread_id: thread_id.to_string(),
        }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tool_id, self.thread_id)
    }
}
