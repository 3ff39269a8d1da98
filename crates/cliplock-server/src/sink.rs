//! Non-blocking log sink: a bounded channel drained by one writer task.
//!
//! Producers (the recorder, the request middleware, the timer loops) call
//! [`SinkHandle::send`], which never blocks; when the queue is full the
//! record is dropped. Metric counters live in the recorder and are
//! unaffected by drops. The sink task routes records to their streams,
//! honors the per-stream `log_*` flags, flushes the buffered writers every
//! few seconds and drains the queue once more on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cliplock_core::{DailySummary, LockEvent, LogSink, MinuteMetrics, ToolEvent};

use crate::config::Config;
use crate::logfiles::{LogFileManager, LogStream};
use crate::middleware::RequestLog;

const SINK_QUEUE_CAPACITY: usize = 1024;
const FLUSH_PERIOD: Duration = Duration::from_secs(5);

/// Everything the sink can persist.
#[derive(Debug, Clone)]
pub enum LogRecord {
    Request(RequestLog),
    Lock(LockEvent),
    Tool(ToolEvent),
    Metrics(MinuteMetrics),
    Summary(DailySummary),
}

/// Cheap cloneable producer handle.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::Sender<LogRecord>,
}

impl SinkHandle {
    /// Enqueues a record without blocking; drops it when the queue is full.
    pub fn send(&self, record: LogRecord) {
        if self.tx.try_send(record).is_err() {
            tracing::debug!("log sink queue full, dropping record");
        }
    }
}

impl LogSink for SinkHandle {
    fn lock_event(&self, event: &LockEvent) {
        self.send(LogRecord::Lock(event.clone()));
    }

    fn tool_event(&self, event: &ToolEvent) {
        self.send(LogRecord::Tool(event.clone()));
    }
}

/// Spawns the drain task and returns the producer handle.
pub fn spawn(
    files: Arc<LogFileManager>,
    config: Arc<Config>,
    cancel: CancellationToken,
) -> SinkHandle {
    let (tx, mut rx) = mpsc::channel(SINK_QUEUE_CAPACITY);

    tokio::spawn(async move {
        let mut flush = tokio::time::interval(FLUSH_PERIOD);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = flush.tick() => files.flush_all(),
                record = rx.recv() => match record {
                    Some(record) => write_record(&files, &config, record),
                    None => break,
                },
            }
        }

        // Final drain so shutdown does not lose already-queued records.
        while let Ok(record) = rx.try_recv() {
            write_record(&files, &config, record);
        }
        files.flush_all();
        tracing::debug!("log sink stopped");
    });

    SinkHandle { tx }
}

fn write_record(files: &LogFileManager, config: &Config, record: LogRecord) {
    let result = match record {
        LogRecord::Request(entry) if config.log_requests => {
            files.append_jsonl(LogStream::Requests, &entry)
        }
        LogRecord::Lock(event) if config.log_events => {
            files.append_jsonl(LogStream::LockEvents, &event)
        }
        LogRecord::Tool(event) if config.log_events => {
            files.append_jsonl(LogStream::ToolEvents, &event)
        }
        LogRecord::Metrics(metrics) if config.log_metrics => {
            files.append_jsonl(LogStream::Metrics, &metrics)
        }
        LogRecord::Summary(summary) if config.log_summary => files.write_summary(&summary),
        _ => Ok(()),
    };

    // Sink I/O failures never influence lock state; record and move on.
    if let Err(err) = result {
        tracing::warn!(%err, "failed to write log record");
    }
}
