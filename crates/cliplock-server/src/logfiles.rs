//! Dated log files under the configured log directory.
//!
//! Layout (a contract for operators and external tooling):
//!
//! ```text
//! <log_dir>/requests/<YYYY-MM-DD>.jsonl
//! <log_dir>/events/lock/<YYYY-MM-DD>.jsonl
//! <log_dir>/events/tool/<YYYY-MM-DD>.jsonl
//! <log_dir>/metrics/<YYYY-MM-DD>.jsonl
//! <log_dir>/summary/<YYYY-MM-DD>.json
//! ```
//!
//! jsonl streams are append-only, one object per line, through buffered
//! writers that rotate when the UTC date changes and are flushed on a
//! timer by the sink task. The summary file is rewritten atomically
//! (temp file + rename). Files older than the retention window are
//! removed by a periodic cleanup.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde::Serialize;

use cliplock_core::Clock;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The append-only jsonl streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStream {
    Requests,
    LockEvents,
    ToolEvents,
    Metrics,
}

impl LogStream {
    fn key(self) -> &'static str {
        match self {
            LogStream::Requests => "requests",
            LogStream::LockEvents => "lock_events",
            LogStream::ToolEvents => "tool_events",
            LogStream::Metrics => "metrics",
        }
    }

    fn dir(self, base: &Path) -> PathBuf {
        match self {
            LogStream::Requests => base.join("requests"),
            LogStream::LockEvents => base.join("events").join("lock"),
            LogStream::ToolEvents => base.join("events").join("tool"),
            LogStream::Metrics => base.join("metrics"),
        }
    }
}

struct DatedWriter {
    date: String,
    writer: BufWriter<File>,
}

pub struct LogFileManager {
    base_dir: PathBuf,
    retention_days: u32,
    clock: Arc<dyn Clock>,
    writers: Mutex<HashMap<&'static str, DatedWriter>>,
}

impl LogFileManager {
    /// Creates the directory layout and an empty writer table.
    pub fn new(base_dir: &Path, retention_days: u32, clock: Arc<dyn Clock>) -> io::Result<Self> {
        for stream in [
            LogStream::Requests,
            LogStream::LockEvents,
            LogStream::ToolEvents,
            LogStream::Metrics,
        ] {
            std::fs::create_dir_all(stream.dir(base_dir))?;
        }
        std::fs::create_dir_all(base_dir.join("summary"))?;

        tracing::info!(
            base_dir = %base_dir.display(),
            retention_days,
            "log file manager initialized"
        );

        Ok(LogFileManager {
            base_dir: base_dir.to_path_buf(),
            retention_days,
            clock,
            writers: Mutex::new(HashMap::new()),
        })
    }

    fn today(&self) -> String {
        self.clock.now_utc().format(DATE_FORMAT).to_string()
    }

    /// Appends one JSON object as a line to today's file for the stream.
    pub fn append_jsonl<T: Serialize>(&self, stream: LogStream, value: &T) -> io::Result<()> {
        let line = serde_json::to_vec(value)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let today = self.today();

        let mut writers = self.writers.lock().unwrap_or_else(|e| e.into_inner());

        let stale = writers
            .get(stream.key())
            .map(|existing| existing.date != today)
            .unwrap_or(true);
        if stale {
            // Date changed or first write: flush and replace the writer.
            if let Some(mut old) = writers.remove(stream.key()) {
                let _ = old.writer.flush();
            }
            let path = stream.dir(&self.base_dir).join(format!("{today}.jsonl"));
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            writers.insert(
                stream.key(),
                DatedWriter {
                    date: today,
                    writer: BufWriter::new(file),
                },
            );
        }

        let entry = writers
            .get_mut(stream.key())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log writer missing"))?;
        entry.writer.write_all(&line)?;
        entry.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Atomically rewrites today's summary file.
    pub fn write_summary<T: Serialize>(&self, value: &T) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let dir = self.base_dir.join("summary");
        let path = dir.join(format!("{}.json", self.today()));
        let tmp = dir.join(format!("{}.json.tmp", self.today()));

        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Flushes every open buffered writer.
    pub fn flush_all(&self) {
        let mut writers = self.writers.lock().unwrap_or_else(|e| e.into_inner());
        for (key, entry) in writers.iter_mut() {
            if let Err(err) = entry.writer.flush() {
                tracing::warn!(stream = key, %err, "failed to flush log writer");
            }
        }
    }

    /// Removes log files older than the retention window. Returns the
    /// number of files removed.
    pub fn cleanup_old_logs(&self) -> usize {
        let cutoff = self.clock.now_utc().date_naive()
            - chrono::Days::new(u64::from(self.retention_days));
        let mut removed = 0;

        for dir in self.all_dirs() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                let Some(date) = parse_file_date(&name) else {
                    continue;
                };
                if date < cutoff {
                    let path = entry.path();
                    match std::fs::remove_file(&path) {
                        Ok(()) => {
                            removed += 1;
                            tracing::debug!(path = %path.display(), "removed old log file");
                        }
                        Err(err) => {
                            tracing::warn!(path = %path.display(), %err, "failed to remove old log file");
                        }
                    }
                }
            }
        }

        if removed > 0 {
            tracing::info!(count = removed, "cleaned up old log files");
        }
        removed
    }

    /// Statistics for the debug endpoint: per-stream file counts, total
    /// size, and the date range on disk.
    pub fn stats(&self) -> LogStats {
        let mut files = HashMap::new();
        let mut total_size: u64 = 0;
        let mut oldest: Option<String> = None;
        let mut newest: Option<String> = None;

        let named_dirs = [
            ("requests", LogStream::Requests.dir(&self.base_dir)),
            ("lock", LogStream::LockEvents.dir(&self.base_dir)),
            ("tool", LogStream::ToolEvents.dir(&self.base_dir)),
            ("metrics", LogStream::Metrics.dir(&self.base_dir)),
            ("summary", self.base_dir.join("summary")),
        ];

        for (name, dir) in named_dirs {
            let mut count = 0;
            if let Ok(entries) = std::fs::read_dir(&dir) {
                for entry in entries.flatten() {
                    let Ok(meta) = entry.metadata() else { continue };
                    if meta.is_dir() {
                        continue;
                    }
                    count += 1;
                    total_size += meta.len();

                    let file_name = entry.file_name().to_string_lossy().to_string();
                    if let Some(date) = parse_file_date(&file_name) {
                        let date = date.format(DATE_FORMAT).to_string();
                        if oldest.as_ref().map_or(true, |o| date < *o) {
                            oldest = Some(date.clone());
                        }
                        if newest.as_ref().map_or(true, |n| date > *n) {
                            newest = Some(date);
                        }
                    }
                }
            }
            files.insert(name.to_string(), count);
        }

        LogStats {
            log_dir: self.base_dir.display().to_string(),
            files,
            total_size_mb: total_size as f64 / 1024.0 / 1024.0,
            oldest_log: oldest,
            newest_log: newest,
        }
    }

    fn all_dirs(&self) -> Vec<PathBuf> {
        vec![
            LogStream::Requests.dir(&self.base_dir),
            LogStream::LockEvents.dir(&self.base_dir),
            LogStream::ToolEvents.dir(&self.base_dir),
            LogStream::Metrics.dir(&self.base_dir),
            self.base_dir.join("summary"),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogStats {
    pub log_dir: String,
    pub files: HashMap<String, usize>,
    pub total_size_mb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_log: Option<String>,
}

/// Extracts the date from names like `2026-08-02.jsonl` / `2026-08-02.json`.
fn parse_file_date(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_suffix(".jsonl").or_else(|| name.strip_suffix(".json"))?;
    NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use cliplock_core::ManualClock;

    fn manager(dir: &Path) -> (Arc<ManualClock>, LogFileManager) {
        let clock = Arc::new(ManualClock::new());
        let files = LogFileManager::new(dir, 30, clock.clone()).unwrap();
        (clock, files)
    }

    #[test]
    fn creates_layout_and_appends_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let (clock, files) = manager(tmp.path());

        files
            .append_jsonl(LogStream::Requests, &serde_json::json!({"a": 1}))
            .unwrap();
        files
            .append_jsonl(LogStream::Requests, &serde_json::json!({"a": 2}))
            .unwrap();
        files.flush_all();

        let today = clock.now_utc().format(DATE_FORMAT).to_string();
        let content =
            std::fs::read_to_string(tmp.path().join("requests").join(format!("{today}.jsonl")))
                .unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn summary_is_rewritten_not_appended() {
        let tmp = tempfile::tempdir().unwrap();
        let (clock, files) = manager(tmp.path());

        files.write_summary(&serde_json::json!({"total": 1})).unwrap();
        files.write_summary(&serde_json::json!({"total": 2})).unwrap();

        let today = clock.now_utc().format(DATE_FORMAT).to_string();
        let content =
            std::fs::read_to_string(tmp.path().join("summary").join(format!("{today}.json")))
                .unwrap();
        assert!(content.contains("\"total\": 2"));
        assert!(!content.contains("\"total\": 1"));
    }

    #[test]
    fn cleanup_removes_only_stale_dated_files() {
        let tmp = tempfile::tempdir().unwrap();
        let (clock, files) = manager(tmp.path());

        let requests = tmp.path().join("requests");
        std::fs::write(requests.join("2000-01-01.jsonl"), "{}\n").unwrap();
        std::fs::write(requests.join("not-a-date.jsonl"), "{}\n").unwrap();
        let today = clock.now_utc().format(DATE_FORMAT).to_string();
        std::fs::write(requests.join(format!("{today}.jsonl")), "{}\n").unwrap();

        let removed = files.cleanup_old_logs();
        assert_eq!(removed, 1);
        assert!(!requests.join("2000-01-01.jsonl").exists());
        assert!(requests.join("not-a-date.jsonl").exists());
        assert!(requests.join(format!("{today}.jsonl")).exists());
    }

    #[test]
    fn stats_counts_files_and_dates() {
        let tmp = tempfile::tempdir().unwrap();
        let (_clock, files) = manager(tmp.path());

        files
            .append_jsonl(LogStream::Metrics, &serde_json::json!({"m": 1}))
            .unwrap();
        files.flush_all();

        let stats = files.stats();
        assert_eq!(stats.files["metrics"], 1);
        assert_eq!(stats.files["requests"], 0);
        assert!(stats.oldest_log.is_some());
    }

    #[test]
    fn writer_rotates_when_the_date_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let (clock, files) = manager(tmp.path());

        files
            .append_jsonl(LogStream::Requests, &serde_json::json!({"day": 1}))
            .unwrap();
        let first_day = clock.now_utc().format(DATE_FORMAT).to_string();

        clock.advance(Duration::from_secs(24 * 60 * 60));
        files
            .append_jsonl(LogStream::Requests, &serde_json::json!({"day": 2}))
            .unwrap();
        files.flush_all();

        let second_day = clock.now_utc().format(DATE_FORMAT).to_string();
        assert_ne!(first_day, second_day);
        assert!(tmp.path().join("requests").join(format!("{first_day}.jsonl")).exists());
        assert!(tmp.path().join("requests").join(format!("{second_day}.jsonl")).exists());
    }
}
