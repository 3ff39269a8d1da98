//! Timer-driven maintenance loops.
//!
//! Each loop is an independent tokio task raced against the shared
//! cancellation token. Periods reflect how quickly each invariant must be
//! restored: holder deadlines within a second, waiting TTLs within a few,
//! heartbeats within tens. A missed tick never compromises safety; the
//! next tick recovers. Tick errors are logged and swallowed.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sink::LogRecord;
use crate::state::AppState;

const HEARTBEAT_SWEEP_PERIOD: Duration = Duration::from_secs(30);
const HOLDER_CHECK_PERIOD: Duration = Duration::from_secs(1);
const TTL_SWEEP_PERIOD: Duration = Duration::from_secs(5);
const METRICS_PERIOD: Duration = Duration::from_secs(60);
const LOG_CLEANUP_PERIOD: Duration = Duration::from_secs(60 * 60);

/// Spawns all maintenance loops. The returned handles complete once the
/// state's shutdown token is cancelled.
pub fn spawn(state: &AppState) -> Vec<JoinHandle<()>> {
    tracing::info!("starting background jobs");
    vec![
        spawn_interval(state, "heartbeat_sweep", HEARTBEAT_SWEEP_PERIOD, sweep_heartbeats),
        spawn_interval(state, "lock_expiry", HOLDER_CHECK_PERIOD, |state| {
            state.lock_manager.expire_overdue_holder();
        }),
        spawn_interval(state, "grace_period", HOLDER_CHECK_PERIOD, |state| {
            state.lock_manager.expire_unpolled_holder();
        }),
        spawn_interval(state, "ticket_ttl", TTL_SWEEP_PERIOD, |state| {
            state.lock_manager.sweep_waiting_ttl();
        }),
        spawn_interval(state, "metrics", METRICS_PERIOD, collect_metrics),
        spawn_daily_summary(state),
        spawn_log_cleanup(state),
    ]
}

fn spawn_interval(
    state: &AppState,
    name: &'static str,
    period: Duration,
    tick: impl Fn(&AppState) + Send + 'static,
) -> JoinHandle<()> {
    let state = state.clone();
    let cancel = state.shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick of a tokio interval fires immediately; skip it so
        // a loop's first real pass happens one period after startup.
        interval.tick().await;
        tracing::debug!(task = name, "background task started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => tick(&state),
            }
        }
        tracing::debug!(task = name, "background task stopped");
    })
}

/// Marks heartbeat-lapsed tools offline, then removes their tickets so
/// the lock frees up in the same sweep.
fn sweep_heartbeats(state: &AppState) {
    let lapsed = state.registry.sweep_offline();
    for tool_id in lapsed {
        let removed = state.lock_manager.remove_tool_tickets(&tool_id);
        if !removed.is_empty() {
            tracing::info!(
                tool_id = %tool_id,
                count = removed.len(),
                "removed tickets for offline tool"
            );
        }
    }
}

/// Swaps the minute counters, attaches the live gauges, ships to the sink.
fn collect_metrics(state: &AppState) {
    let mut metrics = state.recorder.minute_metrics();
    metrics.active_tools = state.registry.online_count();
    metrics.queue_length = state.lock_manager.queue_length();
    metrics.current_lock_holder = state.lock_manager.current_holder();

    tracing::debug!(
        active_tools = metrics.active_tools,
        queue_length = metrics.queue_length,
        locks_granted = metrics.locks_granted,
        "metrics collected"
    );
    state.sink.send(LogRecord::Metrics(metrics));
}

/// Writes the daily summary shortly after each UTC midnight.
fn spawn_daily_summary(state: &AppState) -> JoinHandle<()> {
    let state = state.clone();
    let cancel = state.shutdown.clone();
    tokio::spawn(async move {
        loop {
            let until_midnight = duration_until_next_midnight(&state);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(until_midnight) => {
                    let summary = state.recorder.daily_summary();
                    tracing::info!(
                        date = %summary.date,
                        total_requests = summary.total_requests,
                        locks_granted = summary.total_locks_granted,
                        "daily summary generated"
                    );
                    state.sink.send(LogRecord::Summary(summary));
                }
            }
        }
    })
}

fn duration_until_next_midnight(state: &AppState) -> Duration {
    let now = state.clock.now_utc();
    let next_midnight = (now.date_naive() + chrono::Days::new(1))
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc());
    match next_midnight {
        Some(next) => (next - now)
            .to_std()
            .unwrap_or(Duration::from_secs(24 * 60 * 60)),
        None => Duration::from_secs(24 * 60 * 60),
    }
}

/// Prunes files past the retention window, once at startup then hourly.
fn spawn_log_cleanup(state: &AppState) -> JoinHandle<()> {
    let state = state.clone();
    let cancel = state.shutdown.clone();
    tokio::spawn(async move {
        state.log_files.cleanup_old_logs();
        let mut interval = tokio::time::interval(LOG_CLEANUP_PERIOD);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    state.log_files.cleanup_old_logs();
                }
            }
        }
    })
}
