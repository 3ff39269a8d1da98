//! Coordination engine for exclusive clipboard access.
//!
//! Arbitrates a single shared resource among remote automation tools that
//! poll over HTTP: a FIFO ticket queue with one granted holder, a
//! heartbeat-driven tool registry, and an event recorder with minute and
//! daily metrics. Everything runs on an injected [`Clock`], so the timer
//! sweeps and the whole lifecycle are deterministic under test. The HTTP
//! surface, timers and log persistence live in `cliplock-server`.

pub mod clock;
pub mod events;
pub mod id;
pub mod lock_manager;
pub mod recorder;
pub mod registry;
pub mod settings;
pub mod ticket;
pub mod tool;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventObserver, LockEvent, LockEventKind, LogSink, ToolEvent, ToolEventKind};
pub use id::{ThreadKey, TicketId};
pub use lock_manager::{HolderStatus, LockError, LockManager, QueueEntry, QueueStatus};
pub use recorder::{DailySummary, EventRecorder, MinuteMetrics, ToolUsage};
pub use registry::{RegistryError, ToolRegistry};
pub use settings::{CoordinationSettings, InvalidSettings, SharedSettings};
pub use ticket::{ExpireReason, Ticket, TicketStatus};
pub use tool::{Tool, ToolStatus};
