//! Event recorder: recent-event ring buffer plus minute and daily metrics.
//!
//! Strictly downstream of the lock manager and registry; it observes
//! transitions and can never influence them. Counters are atomics, the
//! ring buffer and per-tool usage map sit behind short mutexes, and none
//! of these are ever taken while the lock manager's mutex is held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::events::{EventObserver, LockEvent, LockEventKind, LogSink, ToolEvent, ToolEventKind};

const RECENT_EVENTS_CAPACITY: usize = 100;
const TOP_TOOLS_LIMIT: usize = 10;

/// One minute of counters, swapped out atomically by `minute_metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinuteMetrics {
    pub timestamp: DateTime<Utc>,
    /// Gauges sampled by the caller at collection time.
    pub active_tools: usize,
    pub queue_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_lock_holder: Option<String>,
    pub locks_granted: u64,
    pub locks_released: u64,
    pub locks_expired: u64,
    pub expired_tickets: u64,
    pub failed_requests: u64,
    pub avg_wait_time_ms: u64,
    pub avg_hold_time_ms: u64,
    pub max_queue_length: u64,
    pub max_wait_time_ms: u64,
    pub max_hold_time_ms: u64,
}

/// One day of aggregates, swapped out by `daily_summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    /// YYYY-MM-DD.
    pub date: String,
    pub total_requests: u64,
    pub total_locks_granted: u64,
    pub total_locks_released: u64,
    pub total_locks_expired: u64,
    pub total_tools_registered: u64,
    pub avg_wait_time_ms: u64,
    pub avg_hold_time_ms: u64,
    pub max_queue_length: u64,
    pub max_wait_time_ms: u64,
    pub max_hold_time_ms: u64,
    pub error_count: u64,
    pub top_tools: Vec<ToolUsage>,
}

/// Per-tool usage captured in the daily summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUsage {
    pub tool_id: String,
    pub lock_count: u64,
    pub avg_wait_ms: u64,
    pub avg_hold_ms: u64,
}

#[derive(Default)]
struct ToolStats {
    lock_count: u64,
    total_wait_ms: u64,
    total_hold_ms: u64,
}

#[derive(Default)]
struct Counters {
    locks_granted: AtomicU64,
    locks_released: AtomicU64,
    locks_expired: AtomicU64,
    expired_tickets: AtomicU64,
    failed_requests: AtomicU64,
    wait_ms_total: AtomicU64,
    hold_ms_total: AtomicU64,
    wait_count: AtomicU64,
    hold_count: AtomicU64,
    max_queue_length: AtomicU64,
    max_wait_ms: AtomicU64,
    max_hold_ms: AtomicU64,
    // Daily only.
    requests: AtomicU64,
    tools_registered: AtomicU64,
}

impl Counters {
    fn averages(&self) -> (u64, u64) {
        let wait_count = self.wait_count.swap(0, Ordering::Relaxed);
        let hold_count = self.hold_count.swap(0, Ordering::Relaxed);
        let wait_total = self.wait_ms_total.swap(0, Ordering::Relaxed);
        let hold_total = self.hold_ms_total.swap(0, Ordering::Relaxed);
        (
            if wait_count > 0 { wait_total / wait_count } else { 0 },
            if hold_count > 0 { hold_total / hold_count } else { 0 },
        )
    }
}

struct RecentEvents {
    buf: Vec<LockEvent>,
    next: usize,
}

impl RecentEvents {
    fn push(&mut self, event: LockEvent) {
        if self.buf.len() < RECENT_EVENTS_CAPACITY {
            self.buf.push(event);
        } else {
            self.buf[self.next] = event;
        }
        self.next = (self.next + 1) % RECENT_EVENTS_CAPACITY;
    }

    /// Most recent first.
    fn recent(&self, limit: usize) -> Vec<LockEvent> {
        let len = self.buf.len();
        let take = limit.min(len);
        let mut out = Vec::with_capacity(take);
        for back in 1..=take {
            let idx = (self.next + len - back) % len.max(1);
            out.push(self.buf[idx].clone());
        }
        out
    }
}

/// The engine's single observer: ring buffer, metrics, sink forwarding.
pub struct EventRecorder {
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn LogSink>>,
    log_heartbeats: bool,
    recent: Mutex<RecentEvents>,
    minute: Counters,
    daily: Counters,
    tool_usage: Mutex<HashMap<String, ToolStats>>,
}

impl EventRecorder {
    /// `sink` is optional so engine tests can run without any I/O plumbing.
    /// Heartbeat events are suppressed from the sink unless
    /// `log_heartbeats` is set; they are too frequent to keep by default.
    pub fn new(clock: Arc<dyn Clock>, sink: Option<Arc<dyn LogSink>>, log_heartbeats: bool) -> Self {
        EventRecorder {
            clock,
            sink,
            log_heartbeats,
            recent: Mutex::new(RecentEvents {
                buf: Vec::with_capacity(RECENT_EVENTS_CAPACITY),
                next: 0,
            }),
            minute: Counters::default(),
            daily: Counters::default(),
            tool_usage: Mutex::new(HashMap::new()),
        }
    }

    /// Counts an HTTP request toward the daily totals.
    pub fn record_request(&self) {
        self.daily.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a failed request (4xx/5xx) toward both windows.
    pub fn record_failure(&self) {
        self.minute.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.daily.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns up to `limit` recent lock events, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<LockEvent> {
        let recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.recent(limit.min(RECENT_EVENTS_CAPACITY))
    }

    /// Swaps the minute counters to zero and returns the snapshot.
    /// Gauges (`active_tools`, `queue_length`, holder) are left for the
    /// caller to fill in from live state.
    pub fn minute_metrics(&self) -> MinuteMetrics {
        let (avg_wait, avg_hold) = self.minute.averages();
        MinuteMetrics {
            timestamp: self.clock.now_utc(),
            active_tools: 0,
            queue_length: 0,
            current_lock_holder: None,
            locks_granted: self.minute.locks_granted.swap(0, Ordering::Relaxed),
            locks_released: self.minute.locks_released.swap(0, Ordering::Relaxed),
            locks_expired: self.minute.locks_expired.swap(0, Ordering::Relaxed),
            expired_tickets: self.minute.expired_tickets.swap(0, Ordering::Relaxed),
            failed_requests: self.minute.failed_requests.swap(0, Ordering::Relaxed),
            avg_wait_time_ms: avg_wait,
            avg_hold_time_ms: avg_hold,
            max_queue_length: self.minute.max_queue_length.swap(0, Ordering::Relaxed),
            max_wait_time_ms: self.minute.max_wait_ms.swap(0, Ordering::Relaxed),
            max_hold_time_ms: self.minute.max_hold_ms.swap(0, Ordering::Relaxed),
        }
    }

    /// Swaps the daily counters to zero, captures the top tools by lock
    /// count and resets the per-tool stats.
    pub fn daily_summary(&self) -> DailySummary {
        let (avg_wait, avg_hold) = self.daily.averages();
        DailySummary {
            date: self.clock.now_utc().format("%Y-%m-%d").to_string(),
            total_requests: self.daily.requests.swap(0, Ordering::Relaxed),
            total_locks_granted: self.daily.locks_granted.swap(0, Ordering::Relaxed),
            total_locks_released: self.daily.locks_released.swap(0, Ordering::Relaxed),
            total_locks_expired: self.daily.locks_expired.swap(0, Ordering::Relaxed),
            total_tools_registered: self.daily.tools_registered.swap(0, Ordering::Relaxed),
            avg_wait_time_ms: avg_wait,
            avg_hold_time_ms: avg_hold,
            max_queue_length: self.daily.max_queue_length.swap(0, Ordering::Relaxed),
            max_wait_time_ms: self.daily.max_wait_ms.swap(0, Ordering::Relaxed),
            max_hold_time_ms: self.daily.max_hold_ms.swap(0, Ordering::Relaxed),
            error_count: self.daily.failed_requests.swap(0, Ordering::Relaxed),
            top_tools: self.take_top_tools(TOP_TOOLS_LIMIT),
        }
    }

    fn take_top_tools(&self, limit: usize) -> Vec<ToolUsage> {
        let mut usage = self.tool_usage.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<ToolUsage> = usage
            .iter()
            .map(|(tool_id, stats)| ToolUsage {
                tool_id: tool_id.clone(),
                lock_count: stats.lock_count,
                avg_wait_ms: if stats.lock_count > 0 {
                    stats.total_wait_ms / stats.lock_count
                } else {
                    0
                },
                avg_hold_ms: if stats.lock_count > 0 {
                    stats.total_hold_ms / stats.lock_count
                } else {
                    0
                },
            })
            .collect();
        entries.sort_by(|a, b| b.lock_count.cmp(&a.lock_count).then(a.tool_id.cmp(&b.tool_id)));
        entries.truncate(limit);
        usage.clear();
        entries
    }

    fn count_lock_event(&self, event: &LockEvent) {
        match event.event_type {
            LockEventKind::LockRequested => {
                if let Some(len) = event.queue_length {
                    self.minute.max_queue_length.fetch_max(len as u64, Ordering::Relaxed);
                    self.daily.max_queue_length.fetch_max(len as u64, Ordering::Relaxed);
                }
            }
            LockEventKind::LockGranted => {
                let wait = event.wait_duration_ms.unwrap_or(0);
                for window in [&self.minute, &self.daily] {
                    window.locks_granted.fetch_add(1, Ordering::Relaxed);
                    window.wait_ms_total.fetch_add(wait, Ordering::Relaxed);
                    window.wait_count.fetch_add(1, Ordering::Relaxed);
                    window.max_wait_ms.fetch_max(wait, Ordering::Relaxed);
                }
                let mut usage = self.tool_usage.lock().unwrap_or_else(|e| e.into_inner());
                usage.entry(event.tool_id.clone()).or_default().total_wait_ms += wait;
            }
            LockEventKind::LockReleased => {
                let hold = event.hold_duration_ms.unwrap_or(0);
                for window in [&self.minute, &self.daily] {
                    window.locks_released.fetch_add(1, Ordering::Relaxed);
                    window.hold_ms_total.fetch_add(hold, Ordering::Relaxed);
                    window.hold_count.fetch_add(1, Ordering::Relaxed);
                    window.max_hold_ms.fetch_max(hold, Ordering::Relaxed);
                }
                let mut usage = self.tool_usage.lock().unwrap_or_else(|e| e.into_inner());
                let stats = usage.entry(event.tool_id.clone()).or_default();
                stats.lock_count += 1;
                stats.total_hold_ms += hold;
            }
            LockEventKind::LockExpired => {
                self.minute.locks_expired.fetch_add(1, Ordering::Relaxed);
                self.daily.locks_expired.fetch_add(1, Ordering::Relaxed);
            }
            LockEventKind::TicketExpired => {
                self.minute.expired_tickets.fetch_add(1, Ordering::Relaxed);
            }
            LockEventKind::LockExtended => {}
        }
    }
}

impl EventObserver for EventRecorder {
    fn lock_event(&self, event: LockEvent) {
        self.count_lock_event(&event);
        {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            recent.push(event.clone());
        }
        if let Some(sink) = &self.sink {
            sink.lock_event(&event);
        }
    }

    fn tool_event(&self, event: ToolEvent) {
        match event.event_type {
            ToolEventKind::ToolRegistered => {
                self.daily.tools_registered.fetch_add(1, Ordering::Relaxed);
            }
            ToolEventKind::ToolHeartbeat if !self.log_heartbeats => return,
            _ => {}
        }
        if let Some(sink) = &self.sink {
            sink.tool_event(&event);
        }
    }
}
