//! Runtime tunables for the coordination engine.
//!
//! Field units match the wire and config-file representation (seconds,
//! except `poll_interval` in milliseconds); `Duration` accessors exist for
//! the engine. The settings live behind a `RwLock` so a config PATCH takes
//! effect on the next operation without restarting anything.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine tunables, hot-reloadable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationSettings {
    /// Seconds without a heartbeat before a tool is marked offline.
    pub heartbeat_timeout: u64,
    /// Suggested client heartbeat interval, seconds.
    pub heartbeat_interval: u64,
    /// Suggested client poll interval, milliseconds.
    pub poll_interval: u64,
    /// Seconds a waiting ticket may go unpolled before expiring.
    pub ticket_ttl: u64,
    /// Whether a poll resets the waiting-ticket TTL clock.
    pub ticket_ttl_on_poll: bool,
    /// Maximum seconds a holder may keep the lock per grant/extend.
    pub lock_max_duration: u64,
    /// Whether holders may extend their lock.
    pub lock_extendable: bool,
    /// Maximum number of successful extends per ticket.
    pub lock_extend_max: u32,
    /// Seconds after a grant within which the holder must poll once.
    pub lock_grace_period: u64,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        CoordinationSettings {
            heartbeat_timeout: 300,
            heartbeat_interval: 120,
            poll_interval: 200,
            ticket_ttl: 120,
            ticket_ttl_on_poll: true,
            lock_max_duration: 20,
            lock_extendable: true,
            lock_extend_max: 2,
            lock_grace_period: 5,
        }
    }
}

/// A settings value that failed validation.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvalidSettings(pub String);

impl CoordinationSettings {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn ticket_ttl(&self) -> Duration {
        Duration::from_secs(self.ticket_ttl)
    }

    pub fn lock_max_duration(&self) -> Duration {
        Duration::from_secs(self.lock_max_duration)
    }

    pub fn lock_grace_period(&self) -> Duration {
        Duration::from_secs(self.lock_grace_period)
    }

    /// Checks the relational constraints between the tunables.
    pub fn validate(&self) -> Result<(), InvalidSettings> {
        for (name, value) in [
            ("heartbeat_timeout", self.heartbeat_timeout),
            ("heartbeat_interval", self.heartbeat_interval),
            ("poll_interval", self.poll_interval),
            ("ticket_ttl", self.ticket_ttl),
            ("lock_max_duration", self.lock_max_duration),
            ("lock_grace_period", self.lock_grace_period),
        ] {
            if value == 0 {
                return Err(InvalidSettings(format!("{name} must be positive")));
            }
        }

        if self.poll_interval >= self.ticket_ttl * 1000 {
            return Err(InvalidSettings(format!(
                "poll_interval ({}ms) must be less than ticket_ttl ({}s)",
                self.poll_interval, self.ticket_ttl
            )));
        }
        if self.lock_grace_period >= self.lock_max_duration {
            return Err(InvalidSettings(format!(
                "lock_grace_period ({}s) must be less than lock_max_duration ({}s)",
                self.lock_grace_period, self.lock_max_duration
            )));
        }
        if self.heartbeat_interval >= self.heartbeat_timeout {
            return Err(InvalidSettings(format!(
                "heartbeat_interval ({}s) must be less than heartbeat_timeout ({}s)",
                self.heartbeat_interval, self.heartbeat_timeout
            )));
        }

        Ok(())
    }
}

/// Handle shared between the HTTP layer, the engine, and the timer loops.
pub type SharedSettings = Arc<RwLock<CoordinationSettings>>;

pub fn shared(settings: CoordinationSettings) -> SharedSettings {
    Arc::new(RwLock::new(settings))
}

/// Reads a consistent snapshot of the current settings.
pub fn snapshot(settings: &SharedSettings) -> CoordinationSettings {
    settings.read().unwrap_or_else(|e| e.into_inner()).clone()
}
