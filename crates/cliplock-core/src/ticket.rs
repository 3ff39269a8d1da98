//! Lock ticket lifecycle.
//!
//! A ticket is created `waiting`, may be granted (becoming the single
//! holder), and ends in one of the terminal states `released` or
//! `expired`. All time predicates take the current monotonic reading as a
//! parameter; the ticket itself never consults a clock.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::id::{ThreadKey, TicketId};

/// Lifecycle state of a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Waiting,
    Granted,
    Expired,
    Released,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Waiting => "waiting",
            TicketStatus::Granted => "granted",
            TicketStatus::Expired => "expired",
            TicketStatus::Released => "released",
        }
    }
}

/// Why a ticket transitioned to `expired`. Stable wire strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpireReason {
    /// A waiting ticket went unpolled past the ticket TTL.
    TtlExpired,
    /// The holder kept the lock past the maximum duration.
    MaxDurationExpired,
    /// The holder never polled within the grace period after grant.
    GracePeriodExpired,
    /// The owning tool went offline.
    ToolOffline,
}

impl ExpireReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpireReason::TtlExpired => "ttl_expired",
            ExpireReason::MaxDurationExpired => "max_duration_expired",
            ExpireReason::GracePeriodExpired => "grace_period_expired",
            ExpireReason::ToolOffline => "tool_offline",
        }
    }
}

/// A lock request record.
///
/// Times are monotonic instants; wall-clock rendering happens at the
/// serialization boundary.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub tool_id: String,
    pub thread_id: String,
    pub requested_at: Instant,
    pub status: TicketStatus,
    pub granted_at: Option<Instant>,
    pub expires_at: Option<Instant>,
    /// Initialised to `requested_at`, so the waiting TTL clock starts at
    /// enqueue even if the client never polls.
    pub last_poll_at: Instant,
    pub extend_count: u32,
    pub expire_reason: Option<ExpireReason>,
    /// Set on release/expire; terminal records are purged once stale.
    pub terminal_at: Option<Instant>,
}

impl Ticket {
    /// Creates a new `waiting` ticket with a fresh random id.
    pub fn new(tool_id: &str, thread_id: &str, now: Instant) -> Self {
        Ticket {
            ticket_id: TicketId::generate(),
            tool_id: tool_id.to_string(),
            thread_id: thread_id.to_string(),
            requested_at: now,
            status: TicketStatus::Waiting,
            granted_at: None,
            expires_at: None,
            last_poll_at: now,
            extend_count: 0,
            expire_reason: None,
            terminal_at: None,
        }
    }

    pub fn key(&self) -> ThreadKey {
        ThreadKey::new(&self.tool_id, &self.thread_id)
    }

    pub fn is_waiting(&self) -> bool {
        self.status == TicketStatus::Waiting
    }

    pub fn is_granted(&self) -> bool {
        self.status == TicketStatus::Granted
    }

    /// Waiting or granted: the ticket still occupies its thread key.
    pub fn is_live(&self) -> bool {
        self.is_waiting() || self.is_granted()
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }

    /// Grants the lock to this ticket for `duration`.
    pub fn grant(&mut self, now: Instant, duration: Duration) {
        debug_assert!(self.is_waiting(), "grant on a non-waiting ticket");
        self.status = TicketStatus::Granted;
        self.granted_at = Some(now);
        self.expires_at = Some(now + duration);
    }

    pub fn release(&mut self, now: Instant) {
        self.status = TicketStatus::Released;
        self.terminal_at = Some(now);
    }

    pub fn expire(&mut self, now: Instant, reason: ExpireReason) {
        self.status = TicketStatus::Expired;
        self.expire_reason = Some(reason);
        self.terminal_at = Some(now);
    }

    /// Pushes the expiry out to `now + duration`. The grant time is left
    /// untouched; the grace-period check keys off the original grant.
    pub fn extend(&mut self, now: Instant, duration: Duration) {
        debug_assert!(self.is_granted(), "extend on a non-granted ticket");
        self.expires_at = Some(now + duration);
        self.extend_count += 1;
    }

    pub fn touch_poll(&mut self, now: Instant) {
        self.last_poll_at = now;
    }

    /// Granted and past its expiry.
    pub fn is_lock_expired(&self, now: Instant) -> bool {
        match (self.status, self.expires_at) {
            (TicketStatus::Granted, Some(expires_at)) => now > expires_at,
            _ => false,
        }
    }

    /// Waiting and unpolled for longer than `ttl`.
    pub fn is_ttl_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.is_waiting() && now.saturating_duration_since(self.last_poll_at) > ttl
    }

    /// Granted, never polled since the grant, and past the grace window.
    pub fn is_grace_expired(&self, now: Instant, grace: Duration) -> bool {
        match (self.status, self.granted_at) {
            (TicketStatus::Granted, Some(granted_at)) => {
                self.last_poll_at <= granted_at
                    && now.saturating_duration_since(granted_at) > grace
            }
            _ => false,
        }
    }

    /// Time spent in the queue: up to the grant for granted tickets,
    /// otherwise up to `now`.
    pub fn wait_duration(&self, now: Instant) -> Duration {
        match self.granted_at {
            Some(granted_at) => granted_at.saturating_duration_since(self.requested_at),
            None => now.saturating_duration_since(self.requested_at),
        }
    }

    /// Time the lock has been held; zero unless granted or released.
    pub fn hold_duration(&self, now: Instant) -> Duration {
        match (self.status, self.granted_at) {
            (TicketStatus::Granted | TicketStatus::Released, Some(granted_at)) => {
                now.saturating_duration_since(granted_at)
            }
            _ => Duration::ZERO,
        }
    }

    /// Remaining lock time; zero once expired or not granted.
    pub fn remaining(&self, now: Instant) -> Duration {
        match (self.status, self.expires_at) {
            (TicketStatus::Granted, Some(expires_at)) => {
                expires_at.saturating_duration_since(now)
            }
            _ => Duration::ZERO,
        }
    }
}
