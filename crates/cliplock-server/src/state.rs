//! Application state: the long-lived engine singletons, wired in one
//! place and injected into handlers and timer loops.
//!
//! Nothing here is a module-level static. `main` builds one [`AppState`]
//! (over the system clock) and hands clones to the router and the
//! background tasks; tests build one over a [`ManualClock`] and a temp
//! log directory. The sink task is spawned here so every constructor
//! wires the recorder to persistence the same way.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use cliplock_core::settings::{self, SharedSettings};
use cliplock_core::{Clock, EventRecorder, LockManager, SystemClock, ToolRegistry};

use crate::config::Config;
use crate::error::ApiError;
use crate::logfiles::LogFileManager;
use crate::sink::{self, SinkHandle};

/// Shared server state, cloned per handler invocation.
#[derive(Clone)]
pub struct AppState {
    /// Startup config snapshot. Coordination values inside are the boot
    /// values; live ones are in `settings`.
    pub config: Arc<Config>,
    /// Hot-reloadable coordination tunables.
    pub settings: SharedSettings,
    pub registry: Arc<ToolRegistry>,
    pub lock_manager: Arc<LockManager>,
    pub recorder: Arc<EventRecorder>,
    pub log_files: Arc<LogFileManager>,
    pub sink: SinkHandle,
    pub clock: Arc<dyn Clock>,
    pub started_at: Instant,
    /// Cancels the sink task and the timer loops on shutdown.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Production state over the system clock.
    pub fn new(config: Config) -> Result<Self, ApiError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// State over an injected clock; used by tests to drive time.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self, ApiError> {
        let config = Arc::new(config);
        let settings = settings::shared(config.coordination.clone());
        let shutdown = CancellationToken::new();

        let log_files = Arc::new(
            LogFileManager::new(&config.log_dir, config.log_retention_days, clock.clone())
                .map_err(|err| {
                    ApiError::Internal(format!("failed to initialize log directory: {err}"))
                })?,
        );
        let sink = sink::spawn(log_files.clone(), config.clone(), shutdown.clone());

        let recorder = Arc::new(EventRecorder::new(
            clock.clone(),
            Some(Arc::new(sink.clone())),
            config.log_heartbeats,
        ));
        let registry = Arc::new(ToolRegistry::new(
            settings.clone(),
            recorder.clone(),
            clock.clone(),
        ));
        let lock_manager = Arc::new(LockManager::new(
            settings.clone(),
            registry.clone(),
            recorder.clone(),
            clock.clone(),
        ));

        let started_at = clock.now();
        Ok(AppState {
            config,
            settings,
            registry,
            lock_manager,
            recorder,
            log_files,
            sink,
            clock,
            started_at,
            shutdown,
        })
    }
}
