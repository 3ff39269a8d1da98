//! Server configuration loaded from a YAML file.
//!
//! A missing file falls back to defaults; unknown fields are ignored for
//! forward compatibility. The coordination tunables are flattened into the
//! same document and become the initial [`CoordinationSettings`] snapshot;
//! a subset of them can be changed at runtime through `PATCH /config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cliplock_core::{CoordinationSettings, InvalidSettings};

const VALID_LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,

    #[serde(flatten)]
    pub coordination: CoordinationSettings,

    pub log_dir: PathBuf,
    pub log_retention_days: u32,
    pub log_level: String,
    pub log_requests: bool,
    pub log_events: bool,
    pub log_metrics: bool,
    pub log_summary: bool,
    /// Heartbeat events are noisy; off by default.
    pub log_heartbeats: bool,

    /// Retry suggestions surfaced to clients at registration.
    pub client_retry_max: u32,
    pub client_retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8899,
            coordination: CoordinationSettings::default(),
            log_dir: PathBuf::from("./logs"),
            log_retention_days: 30,
            log_level: "info".to_string(),
            log_requests: true,
            log_events: true,
            log_metrics: true,
            log_summary: true,
            log_heartbeats: false,
            client_retry_max: 3,
            client_retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Invalid(#[from] InvalidSettings),
}

impl Config {
    /// Loads config from a YAML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validates the server-level knobs and the coordination constraints.
    pub fn validate(&self) -> Result<(), InvalidSettings> {
        if self.port == 0 {
            return Err(InvalidSettings(
                "port must be between 1 and 65535".to_string(),
            ));
        }
        if self.log_retention_days < 1 {
            return Err(InvalidSettings(
                "log_retention_days must be at least 1".to_string(),
            ));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(InvalidSettings(format!(
                "log_level must be one of: debug, info, warn, error (got: {})",
                self.log_level
            )));
        }
        self.coordination.validate()
    }

    /// The subset of settings clients need, returned on registration.
    pub fn client_config(&self, coordination: &CoordinationSettings) -> ClientConfig {
        ClientConfig {
            heartbeat_interval: coordination.heartbeat_interval,
            heartbeat_timeout: coordination.heartbeat_timeout,
            poll_interval: coordination.poll_interval,
            ticket_ttl: coordination.ticket_ttl,
            lock_max_duration: coordination.lock_max_duration,
            client_retry_max: self.client_retry_max,
            client_retry_delay_ms: self.client_retry_delay_ms,
        }
    }
}

/// Client-facing configuration hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub heartbeat_interval: u64,
    pub heartbeat_timeout: u64,
    pub poll_interval: u64,
    pub ticket_ttl: u64,
    pub lock_max_duration: u64,
    pub client_retry_max: u32,
    pub client_retry_delay_ms: u64,
}
