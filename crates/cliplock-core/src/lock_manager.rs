//! FIFO ticket queue with a single granted holder.
//!
//! All state lives behind one mutex; critical sections contain no I/O and
//! no calls into other locks. Events describing a transition are collected
//! during the mutation and published only after the guard is dropped, so
//! an observer can never see a transition before it is committed and the
//! recorder's internal locks never nest under the manager's mutex.
//!
//! Terminal tickets (released / expired) leave the queue, the holder slot
//! and the thread-key index immediately, but stay in the id map so the
//! owner's next status check can still read the terminal state and reason.
//! The waiting-TTL sweep purges terminal records once they are older than
//! the ticket TTL.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::events::{EventObserver, LockEvent, LockEventKind};
use crate::id::{ThreadKey, TicketId};
use crate::registry::ToolRegistry;
use crate::settings::{snapshot, CoordinationSettings, SharedSettings};
use crate::ticket::{ExpireReason, Ticket};

/// Errors from lock operations. Each maps to a stable wire code.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("ticket not found")]
    TicketNotFound,

    #[error("ticket is not the current lock holder")]
    NotHolder,

    #[error("tool is not online")]
    ToolOffline,

    #[error("lock extend is disabled")]
    ExtendDisabled,

    #[error("maximum extend count reached")]
    MaxExtendReached,
}

/// Read-only view of the queue, produced under the manager mutex.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_lock: Option<HolderStatus>,
    pub queue: Vec<QueueEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HolderStatus {
    pub ticket_id: TicketId,
    pub tool_id: String,
    pub thread_id: String,
    pub granted_at: DateTime<Utc>,
    pub expires_in_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub position: usize,
    pub tool_id: String,
    pub thread_id: String,
    pub waiting_ms: u64,
}

struct LockState {
    /// Waiting ticket ids in FIFO order.
    queue: VecDeque<TicketId>,
    /// The single granted ticket, if any.
    holder: Option<TicketId>,
    /// Every known ticket, including recent terminal records.
    tickets: HashMap<TicketId, Ticket>,
    /// Live tickets only: one per (tool, thread) pair.
    thread_keys: HashMap<ThreadKey, TicketId>,
}

pub struct LockManager {
    state: Mutex<LockState>,
    settings: SharedSettings,
    registry: Arc<ToolRegistry>,
    observer: Arc<dyn EventObserver>,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(
        settings: SharedSettings,
        registry: Arc<ToolRegistry>,
        observer: Arc<dyn EventObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        LockManager {
            state: Mutex::new(LockState {
                queue: VecDeque::new(),
                holder: None,
                tickets: HashMap::new(),
                thread_keys: HashMap::new(),
            }),
            settings,
            registry,
            observer,
            clock,
        }
    }

    /// Enqueues a lock request for `(tool_id, thread_id)`.
    ///
    /// Returns the ticket and its position: `0` means the lock is held,
    /// `n >= 1` is the 1-based queue position. A repeated request from the
    /// same pair while a live ticket exists returns that ticket unchanged.
    pub fn request_lock(
        &self,
        tool_id: &str,
        thread_id: &str,
    ) -> Result<(Ticket, usize), LockError> {
        if !self.registry.is_online(tool_id) {
            tracing::debug!(tool_id, "lock request from offline tool");
            return Err(LockError::ToolOffline);
        }

        let now = self.clock.now();
        let at = self.clock.now_utc();
        let settings = snapshot(&self.settings);
        let mut events = Vec::new();

        let mut state = self.lock_state();

        let key = ThreadKey::new(tool_id, thread_id);
        if let Some(&existing) = state.thread_keys.get(&key) {
            if let Some(ticket) = state.tickets.get(&existing) {
                if ticket.is_live() {
                    let position = position_of(&state, existing);
                    tracing::debug!(
                        ticket_id = %existing,
                        tool_id,
                        thread_id,
                        position,
                        "returning existing ticket"
                    );
                    return Ok((ticket.clone(), position));
                }
            }
        }

        let ticket = Ticket::new(tool_id, thread_id, now);
        let ticket_id = ticket.ticket_id;

        let mut requested = LockEvent::new(at, LockEventKind::LockRequested, &ticket);
        state.thread_keys.insert(key, ticket_id);
        state.tickets.insert(ticket_id, ticket);
        state.queue.push_back(ticket_id);
        requested.queue_position = Some(state.queue.len());
        requested.queue_length = Some(state.queue.len());
        events.push(requested);

        tracing::info!(
            ticket_id = %ticket_id,
            tool_id,
            thread_id,
            queue_position = state.queue.len(),
            "lock requested, ticket created"
        );

        try_grant_next(&mut state, &settings, now, at, &mut events);

        let position = position_of(&state, ticket_id);
        let snapshot = state
            .tickets
            .get(&ticket_id)
            .cloned()
            .ok_or(LockError::TicketNotFound)?;

        drop(state);
        self.publish(events);
        Ok((snapshot, position))
    }

    /// Reads a ticket's current status, refreshing its poll time.
    ///
    /// The poll time feeds the waiting TTL (when `ticket_ttl_on_poll` is
    /// enabled) and the holder grace-period check (always). Terminal
    /// tickets are returned as-is with no position.
    pub fn check_lock(&self, ticket_id: TicketId) -> Result<(Ticket, Option<usize>), LockError> {
        let now = self.clock.now();
        let settings = snapshot(&self.settings);

        let mut state = self.lock_state();

        let holder = state.holder;
        let in_queue_position = queue_position(&state, ticket_id);
        let ticket = state
            .tickets
            .get_mut(&ticket_id)
            .ok_or(LockError::TicketNotFound)?;

        if ticket.is_waiting() && settings.ticket_ttl_on_poll {
            ticket.touch_poll(now);
        }
        if ticket.is_granted() {
            ticket.touch_poll(now);
        }

        let position = if holder == Some(ticket_id) {
            Some(0)
        } else if ticket.is_live() {
            in_queue_position
        } else {
            None
        };

        tracing::debug!(
            ticket_id = %ticket_id,
            status = ticket.status.as_str(),
            ?position,
            "lock check"
        );

        Ok((ticket.clone(), position))
    }

    /// Releases the lock held by `ticket_id` and grants the next waiter.
    pub fn release_lock(&self, ticket_id: TicketId) -> Result<Ticket, LockError> {
        let now = self.clock.now();
        let at = self.clock.now_utc();
        let settings = snapshot(&self.settings);
        let mut events = Vec::new();

        let mut state = self.lock_state();

        let holder = state.holder;
        let Some(ticket) = state.tickets.get_mut(&ticket_id) else {
            return Err(LockError::TicketNotFound);
        };
        if holder != Some(ticket_id) {
            return Err(LockError::NotHolder);
        }

        let hold = ticket.hold_duration(now);
        ticket.release(now);
        let key = ticket.key();
        let released = ticket.clone();

        state.holder = None;
        state.thread_keys.remove(&key);

        let mut event = LockEvent::new(at, LockEventKind::LockReleased, &released);
        event.hold_duration_ms = Some(hold.as_millis() as u64);
        event.queue_length = Some(state.queue.len());
        events.push(event);

        tracing::info!(
            ticket_id = %ticket_id,
            tool_id = %released.tool_id,
            thread_id = %released.thread_id,
            hold_ms = hold.as_millis() as u64,
            "lock released"
        );

        try_grant_next(&mut state, &settings, now, at, &mut events);

        drop(state);
        self.publish(events);
        Ok(released)
    }

    /// Extends the holder's lock by one `lock_max_duration` increment.
    pub fn extend_lock(&self, ticket_id: TicketId) -> Result<Ticket, LockError> {
        let now = self.clock.now();
        let at = self.clock.now_utc();
        let settings = snapshot(&self.settings);

        if !settings.lock_extendable {
            return Err(LockError::ExtendDisabled);
        }

        let mut state = self.lock_state();

        let holder = state.holder;
        let Some(ticket) = state.tickets.get_mut(&ticket_id) else {
            return Err(LockError::TicketNotFound);
        };
        if holder != Some(ticket_id) {
            return Err(LockError::NotHolder);
        }
        if ticket.extend_count >= settings.lock_extend_max {
            return Err(LockError::MaxExtendReached);
        }

        ticket.extend(now, settings.lock_max_duration());
        let extended = ticket.clone();

        let mut event = LockEvent::new(at, LockEventKind::LockExtended, &extended);
        event.extend_count = Some(extended.extend_count);

        tracing::info!(
            ticket_id = %ticket_id,
            extend_count = extended.extend_count,
            "lock extended"
        );

        drop(state);
        self.publish(vec![event]);
        Ok(extended)
    }

    /// Force-expires the current holder regardless of its deadlines.
    pub fn force_expire_holder(&self, reason: ExpireReason) -> Option<Ticket> {
        self.expire_holder_when(reason, |_, _, _| true)
    }

    /// Expires the holder when it has outlived `lock_max_duration`.
    /// Driven by the 1s timer loop.
    pub fn expire_overdue_holder(&self) -> Option<Ticket> {
        self.expire_holder_when(ExpireReason::MaxDurationExpired, |ticket, now, _| {
            ticket.is_lock_expired(now)
        })
    }

    /// Expires the holder when it never polled within the grace period.
    /// Driven by the 1s timer loop.
    pub fn expire_unpolled_holder(&self) -> Option<Ticket> {
        self.expire_holder_when(ExpireReason::GracePeriodExpired, |ticket, now, settings| {
            ticket.is_grace_expired(now, settings.lock_grace_period())
        })
    }

    fn expire_holder_when(
        &self,
        reason: ExpireReason,
        condition: impl Fn(&Ticket, Instant, &CoordinationSettings) -> bool,
    ) -> Option<Ticket> {
        let now = self.clock.now();
        let at = self.clock.now_utc();
        let settings = snapshot(&self.settings);
        let mut events = Vec::new();

        let mut state = self.lock_state();

        let holder_id = state.holder?;
        let holds = state
            .tickets
            .get(&holder_id)
            .map(|ticket| condition(ticket, now, &settings))
            .unwrap_or(false);
        if !holds {
            return None;
        }

        let expired = expire_holder_locked(&mut state, holder_id, reason, now, at, &mut events)?;
        try_grant_next(&mut state, &settings, now, at, &mut events);

        drop(state);
        self.publish(events);
        Some(expired)
    }

    /// Expires waiting tickets whose TTL lapsed, preserving the relative
    /// order of survivors, and purges stale terminal records.
    pub fn sweep_waiting_ttl(&self) -> Vec<Ticket> {
        let now = self.clock.now();
        let at = self.clock.now_utc();
        let settings = snapshot(&self.settings);
        let ttl = settings.ticket_ttl();
        let mut events = Vec::new();

        let mut state = self.lock_state();

        let lapsed: Vec<TicketId> = state
            .queue
            .iter()
            .copied()
            .filter(|id| {
                state
                    .tickets
                    .get(id)
                    .map(|ticket| ticket.is_ttl_expired(now, ttl))
                    .unwrap_or(false)
            })
            .collect();

        let mut expired = Vec::new();
        for id in &lapsed {
            if let Some(ticket) = state.tickets.get_mut(id) {
                ticket.expire(now, ExpireReason::TtlExpired);
                let key = ticket.key();
                let snapshot = ticket.clone();
                state.thread_keys.remove(&key);

                let mut event = LockEvent::new(at, LockEventKind::TicketExpired, &snapshot);
                event.reason = Some(ExpireReason::TtlExpired.as_str().to_string());
                events.push(event);

                tracing::warn!(
                    ticket_id = %snapshot.ticket_id,
                    tool_id = %snapshot.tool_id,
                    "ticket expired: waiting TTL exceeded"
                );
                expired.push(snapshot);
            }
        }
        state.queue.retain(|id| !lapsed.contains(id));

        // Terminal records have served their status-reporting purpose once
        // they are a full TTL old.
        state
            .tickets
            .retain(|_, ticket| match (ticket.is_terminal(), ticket.terminal_at) {
                (true, Some(terminal_at)) => now.saturating_duration_since(terminal_at) <= ttl,
                _ => true,
            });

        drop(state);
        self.publish(events);
        expired
    }

    /// Removes every ticket belonging to `tool_id`, queued or holding.
    ///
    /// Removed tickets are expired with reason `tool_offline` so the
    /// grant/release/expire counters stay conserved. Frees the lock for
    /// the next waiter when the holder was affected.
    pub fn remove_tool_tickets(&self, tool_id: &str) -> Vec<TicketId> {
        let now = self.clock.now();
        let at = self.clock.now_utc();
        let settings = snapshot(&self.settings);
        let mut events = Vec::new();

        let mut state = self.lock_state();

        let mut removed = Vec::new();

        let holder_owned = state.holder.and_then(|id| {
            state
                .tickets
                .get(&id)
                .filter(|ticket| ticket.tool_id == tool_id)
                .map(|_| id)
        });
        if let Some(holder_id) = holder_owned {
            if let Some(expired) = expire_holder_locked(
                &mut state,
                holder_id,
                ExpireReason::ToolOffline,
                now,
                at,
                &mut events,
            ) {
                removed.push(expired.ticket_id);
            }
        }

        let queued: Vec<TicketId> = state
            .queue
            .iter()
            .copied()
            .filter(|id| {
                state
                    .tickets
                    .get(id)
                    .map(|ticket| ticket.tool_id == tool_id)
                    .unwrap_or(false)
            })
            .collect();
        for id in &queued {
            if let Some(ticket) = state.tickets.get_mut(id) {
                ticket.expire(now, ExpireReason::ToolOffline);
                let key = ticket.key();
                let snapshot = ticket.clone();
                state.thread_keys.remove(&key);

                let mut event = LockEvent::new(at, LockEventKind::TicketExpired, &snapshot);
                event.reason = Some(ExpireReason::ToolOffline.as_str().to_string());
                events.push(event);
                removed.push(*id);
            }
        }
        state.queue.retain(|id| !queued.contains(id));

        if !removed.is_empty() {
            tracing::info!(tool_id, count = removed.len(), "removed tickets for offline tool");
            try_grant_next(&mut state, &settings, now, at, &mut events);
        }

        drop(state);
        self.publish(events);
        removed
    }

    /// Consistent snapshot of the holder and the waiting queue.
    pub fn queue_status(&self) -> QueueStatus {
        let now = self.clock.now();
        let state = self.lock_state();

        let current_lock = state.holder.and_then(|id| state.tickets.get(&id)).map(|ticket| {
            HolderStatus {
                ticket_id: ticket.ticket_id,
                tool_id: ticket.tool_id.clone(),
                thread_id: ticket.thread_id.clone(),
                granted_at: self
                    .clock
                    .wall_time_of(ticket.granted_at.unwrap_or(ticket.requested_at)),
                expires_in_ms: ticket.remaining(now).as_millis() as u64,
            }
        });

        let queue = state
            .queue
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                state.tickets.get(id).map(|ticket| QueueEntry {
                    position: i + 1,
                    tool_id: ticket.tool_id.clone(),
                    thread_id: ticket.thread_id.clone(),
                    waiting_ms: ticket.wait_duration(now).as_millis() as u64,
                })
            })
            .collect::<Vec<_>>();

        QueueStatus {
            queue_length: state.queue.len(),
            current_lock,
            queue,
        }
    }

    /// Rough wait hint for a queue position: position times half the
    /// maximum hold time. Not a promise.
    pub fn estimate_wait(&self, position: usize) -> Duration {
        if position == 0 {
            return Duration::ZERO;
        }
        let settings = snapshot(&self.settings);
        Duration::from_secs(settings.lock_max_duration / 2) * position as u32
    }

    pub fn queue_length(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Tool id of the current holder, if any.
    pub fn current_holder(&self) -> Option<String> {
        let state = self.lock_state();
        state
            .holder
            .and_then(|id| state.tickets.get(&id))
            .map(|ticket| ticket.tool_id.clone())
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, events: Vec<LockEvent>) {
        for event in events {
            self.observer.lock_event(event);
        }
    }
}

/// Grants the queue head when no holder exists. At most one grant per
/// invocation, so the single-holder invariant holds by construction.
fn try_grant_next(
    state: &mut LockState,
    settings: &CoordinationSettings,
    now: Instant,
    at: DateTime<Utc>,
    events: &mut Vec<LockEvent>,
) {
    if state.holder.is_some() {
        return;
    }
    let Some(next) = state.queue.pop_front() else {
        return;
    };
    let Some(ticket) = state.tickets.get_mut(&next) else {
        return;
    };

    let wait = ticket.wait_duration(now);
    ticket.grant(now, settings.lock_max_duration());
    state.holder = Some(next);

    let mut event = LockEvent::new(at, LockEventKind::LockGranted, ticket);
    event.wait_duration_ms = Some(wait.as_millis() as u64);
    event.queue_length = Some(state.queue.len());
    events.push(event);

    tracing::info!(
        ticket_id = %next,
        tool_id = %ticket.tool_id,
        thread_id = %ticket.thread_id,
        wait_ms = wait.as_millis() as u64,
        "lock granted"
    );
}

/// Expires the current holder and detaches it from the live indices.
fn expire_holder_locked(
    state: &mut LockState,
    holder_id: TicketId,
    reason: ExpireReason,
    now: Instant,
    at: DateTime<Utc>,
    events: &mut Vec<LockEvent>,
) -> Option<Ticket> {
    let ticket = state.tickets.get_mut(&holder_id)?;
    let hold = ticket.hold_duration(now);
    ticket.expire(now, reason);
    let key = ticket.key();
    let expired = ticket.clone();

    state.holder = None;
    state.thread_keys.remove(&key);

    let mut event = LockEvent::new(at, LockEventKind::LockExpired, &expired);
    event.hold_duration_ms = Some(hold.as_millis() as u64);
    event.reason = Some(reason.as_str().to_string());
    events.push(event);

    tracing::warn!(
        ticket_id = %holder_id,
        tool_id = %expired.tool_id,
        reason = reason.as_str(),
        "lock expired"
    );

    Some(expired)
}

/// Position of a live ticket: 0 for the holder, 1-based in the queue.
fn position_of(state: &LockState, ticket_id: TicketId) -> usize {
    if state.holder == Some(ticket_id) {
        return 0;
    }
    queue_position(state, ticket_id).unwrap_or(0)
}

fn queue_position(state: &LockState, ticket_id: TicketId) -> Option<usize> {
    state
        .queue
        .iter()
        .position(|&id| id == ticket_id)
        .map(|i| i + 1)
}
