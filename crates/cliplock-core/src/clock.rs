//! Injectable clock for the coordination engine.
//!
//! All lifecycle arithmetic (grants, TTLs, grace periods) runs on the
//! monotonic [`Clock::now`] reading. Wall-clock readings exist only to
//! render operator-facing timestamps in JSON responses and log lines.
//! Tests drive the engine deterministically with [`ManualClock`].

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Time source shared by every core component.
pub trait Clock: Send + Sync {
    /// Monotonic reading used for every lifecycle comparison.
    fn now(&self) -> Instant;

    /// Wall-clock reading, used only in serialized output.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Renders a stored monotonic instant as a wall-clock time by
    /// offsetting from the current reading.
    fn wall_time_of(&self, instant: Instant) -> DateTime<Utc> {
        let now = self.now();
        if instant >= now {
            self.now_utc() + (instant - now)
        } else {
            self.now_utc() - (now - instant)
        }
    }
}

/// Production clock backed by `Instant::now` and `Utc::now`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests: a base reading plus an offset that only
/// moves forward via [`ManualClock::advance`].
pub struct ManualClock {
    base: Instant,
    epoch: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            base: Instant::now(),
            epoch: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + *offset
    }

    fn now_utc(&self) -> DateTime<Utc> {
        let offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.epoch + *offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_monotonically() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(5));
        let t1 = clock.now();
        assert_eq!(t1 - t0, Duration::from_secs(5));
    }

    #[test]
    fn wall_time_tracks_monotonic_offset() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(Duration::from_secs(30));
        let rendered = clock.wall_time_of(start);
        assert_eq!(clock.now_utc() - rendered, chrono::Duration::seconds(30));
    }
}
