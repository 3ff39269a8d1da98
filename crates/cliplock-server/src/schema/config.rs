//! Schema types for the config endpoints.

use serde::{Deserialize, Serialize};

use cliplock_core::CoordinationSettings;

use crate::config::Config;

/// Partial config update. Only the runtime-safe coordination knobs can be
/// changed while the server runs; unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub poll_interval: Option<u64>,
    pub ticket_ttl: Option<u64>,
    pub lock_max_duration: Option<u64>,
    pub lock_grace_period: Option<u64>,
    pub lock_extendable: Option<bool>,
    pub lock_extend_max: Option<u32>,
}

impl ConfigUpdate {
    /// Applies the present fields onto a candidate settings copy.
    pub fn apply_to(&self, settings: &mut CoordinationSettings) {
        if let Some(v) = self.poll_interval {
            settings.poll_interval = v;
        }
        if let Some(v) = self.ticket_ttl {
            settings.ticket_ttl = v;
        }
        if let Some(v) = self.lock_max_duration {
            settings.lock_max_duration = v;
        }
        if let Some(v) = self.lock_grace_period {
            settings.lock_grace_period = v;
        }
        if let Some(v) = self.lock_extendable {
            settings.lock_extendable = v;
        }
        if let Some(v) = self.lock_extend_max {
            settings.lock_extend_max = v;
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigUpdateResponse {
    pub status: String,
    pub config: Config,
}
