//! Per-task log sink installed around a single handler invocation (spec
//! §4.6). Forwards everything to `tracing` unconditionally and separately
//! buffers the subset worth persisting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use evertask_core::{ExecutionLog, LogLevel, TaskId};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Installed for the duration of one handler invocation (including retries).
/// `sequence_number` is strictly increasing across the whole task lifetime,
/// not reset per attempt.
pub struct LogCapture {
    task_id: TaskId,
    min_persist_level: LogLevel,
    max_persisted_logs: usize,
    sequence: AtomicU64,
    buffered: Mutex<Vec<ExecutionLog>>,
}

impl LogCapture {
    pub fn new(task_id: TaskId, min_persist_level: LogLevel, max_persisted_logs: usize) -> Self {
        Self {
            task_id,
            min_persist_level,
            max_persisted_logs,
            sequence: AtomicU64::new(0),
            buffered: Mutex::new(Vec::new()),
        }
    }

    /// Records one log line. `message` is a closure so a level below the
    /// host's `tracing` filter, or a handler that never logs at all,
    /// doesn't pay for formatting it.
    pub fn log(&self, level: LogLevel, message: impl FnOnce() -> String) {
        let rendered = message();
        self.forward(level, &rendered);

        if level < self.min_persist_level {
            return;
        }
        let mut buffered = self.buffered.lock().expect("log buffer mutex poisoned");
        if buffered.len() >= self.max_persisted_logs {
            return;
        }
        buffered.push(ExecutionLog {
            id: Uuid::new_v4(),
            task_id: self.task_id,
            timestamp_utc: Utc::now(),
            level,
            message: rendered,
            exception_details: None,
            sequence_number: self.sequence.fetch_add(1, Ordering::Relaxed),
        });
    }

    pub fn log_error(&self, message: impl FnOnce() -> String, exception_details: String) {
        let rendered = message();
        self.forward(LogLevel::Error, &rendered);
        if LogLevel::Error < self.min_persist_level {
            return;
        }
        let mut buffered = self.buffered.lock().expect("log buffer mutex poisoned");
        if buffered.len() >= self.max_persisted_logs {
            return;
        }
        buffered.push(ExecutionLog {
            id: Uuid::new_v4(),
            task_id: self.task_id,
            timestamp_utc: Utc::now(),
            level: LogLevel::Error,
            message: rendered,
            exception_details: Some(exception_details),
            sequence_number: self.sequence.fetch_add(1, Ordering::Relaxed),
        });
    }

    fn forward(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => trace!(task_id = %self.task_id, "{}", message),
            LogLevel::Debug => debug!(task_id = %self.task_id, "{}", message),
            LogLevel::Info => info!(task_id = %self.task_id, "{}", message),
            LogLevel::Warn => warn!(task_id = %self.task_id, "{}", message),
            LogLevel::Error => error!(task_id = %self.task_id, "{}", message),
        }
    }

    /// Drains the buffer for a single `AppendLogs` flush.
    pub fn take_buffered(&self) -> Vec<ExecutionLog> {
        std::mem::take(&mut self.buffered.lock().expect("log buffer mutex poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_logs_are_not_buffered() {
        let capture = LogCapture::new(TaskId::new(), LogLevel::Warn, 100);
        capture.log(LogLevel::Info, || "ignored".to_string());
        assert!(capture.take_buffered().is_empty());
    }

    #[test]
    fn sequence_numbers_strictly_increase() {
        let capture = LogCapture::new(TaskId::new(), LogLevel::Trace, 100);
        capture.log(LogLevel::Info, || "first".to_string());
        capture.log(LogLevel::Info, || "second".to_string());
        let logs = capture.take_buffered();
        assert_eq!(logs[0].sequence_number, 0);
        assert_eq!(logs[1].sequence_number, 1);
    }

    #[test]
    fn buffer_caps_at_max_persisted_logs() {
        let capture = LogCapture::new(TaskId::new(), LogLevel::Trace, 2);
        for i in 0..5 {
            capture.log(LogLevel::Info, || format!("line {i}"));
        }
        assert_eq!(capture.take_buffered().len(), 2);
    }
}
