//! Structured JSONL logging for exit hook runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSON line per event with required + optional fields.
//! - [`LogEmitter`]: writes entries to a file, stderr, or a shared buffer.
//! - [`LogBuffer`]: in-memory sink whose lines can be read back (tests).

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

/// Orchestrator step that can fail without stopping the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStep {
    NotifyParent,
    FlushStreams,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<HookStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            task_id: None,
            step: None,
            status: None,
            parent_id: None,
            errno: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task_id = Some(task);
        self
    }

    #[must_use]
    pub fn with_step(mut self, step: HookStep) -> Self {
        self.step = Some(step);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: i32) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: Option<i32>) -> Self {
        self.errno = errno;
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Shared in-memory log sink.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    /// Every complete line written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.bytes.lock())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes JSONL entries, assigning trace ids of the form `task-<id>::<seq>`.
pub struct LogEmitter {
    writer: Box<dyn Write + Send>,
    seq: u64,
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(std::io::BufWriter::new(file)))
    }

    #[must_use]
    pub fn to_stderr() -> Self {
        Self::to_writer(std::io::stderr())
    }

    /// Create an emitter writing into a buffer the caller can read back.
    #[must_use]
    pub fn to_buffer() -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        (Self::to_writer(buffer.clone()), buffer)
    }

    #[must_use]
    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            seq: 0,
        }
    }

    fn next_trace_id(&mut self, task: Option<TaskId>) -> String {
        self.seq += 1;
        match task {
            Some(id) => format!("task-{id}::{:03}", self.seq),
            None => format!("exithook::{:03}", self.seq),
        }
    }

    /// Emit a fully-populated entry. An empty `trace_id` is filled in.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id(entry.task_id);
        }
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl std::fmt::Debug for LogEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEmitter").field("seq", &self.seq).finish()
    }
}

/// Current time as an RFC 3339 UTC timestamp with millisecond precision.
fn now_utc() -> String {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(elapsed.as_secs(), elapsed.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days as i64);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_required_fields_only() {
        let entry = LogEntry::new("task-1::001", LogLevel::Info, "exit_hook_begin");
        let parsed: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["trace_id"], "task-1::001");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "exit_hook_begin");
        assert!(parsed.get("task_id").is_none());
        assert!(parsed.get("step").is_none());
        assert!(parsed.get("errno").is_none());
    }

    #[test]
    fn entry_with_optional_fields() {
        let entry = LogEntry::new("t", LogLevel::Warn, "step_failed")
            .with_task(TaskId(4))
            .with_step(HookStep::NotifyParent)
            .with_status(3)
            .with_parent(TaskId(1))
            .with_errno(Some(3))
            .with_details(serde_json::json!({"failure": "parent_signal"}));
        let parsed: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert_eq!(parsed["level"], "warn");
        assert_eq!(parsed["task_id"], 4);
        assert_eq!(parsed["step"], "notify_parent");
        assert_eq!(parsed["status"], 3);
        assert_eq!(parsed["parent_id"], 1);
        assert_eq!(parsed["errno"], 3);
        assert_eq!(parsed["details"]["failure"], "parent_signal");
    }

    #[test]
    fn emitter_assigns_sequential_trace_ids() {
        let (mut emitter, buffer) = LogEmitter::to_buffer();
        emitter
            .emit_entry(LogEntry::new("", LogLevel::Info, "a").with_task(TaskId(7)))
            .unwrap();
        emitter
            .emit_entry(LogEntry::new("", LogLevel::Info, "b"))
            .unwrap();
        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        let second: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(first["trace_id"], "task-7::001");
        assert_eq!(second["trace_id"], "exithook::002");
    }

    #[test]
    fn entry_round_trips_through_jsonl() {
        let line = LogEntry::new("t", LogLevel::Debug, "exit_hook_begin")
            .with_step(HookStep::FlushStreams)
            .to_jsonl()
            .unwrap();
        let back: LogEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(back.level, LogLevel::Debug);
        assert_eq!(back.step, Some(HookStep::FlushStreams));
    }

    #[test]
    fn utc_formatting_handles_known_dates() {
        assert_eq!(format_utc(0, 0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_utc(951_782_400, 5), "2000-02-29T00:00:00.005Z");
        assert_eq!(format_utc(1_700_000_000, 123), "2023-11-14T22:13:20.123Z");
    }
}
