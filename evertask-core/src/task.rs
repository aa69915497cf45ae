//! The persisted task and its audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::RecurringRule;

/// Opaque 128-bit task identifier. UUIDv7 so that insertion order is
/// recoverable by sorting ids, without a separate sequence column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status a task row may be in. Transitions are constrained by §4.4; a
/// terminal status is written at most once for a non-recurring task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    WaitingQueue,
    Queued,
    InProgress,
    Pending,
    Cancelled,
    Completed,
    Failed,
    ServiceStopped,
}

impl TaskStatus {
    /// Terminal statuses are final: Completed, Failed, Cancelled, ServiceStopped.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Cancelled
                | TaskStatus::ServiceStopped
        )
    }
}

/// Per-task audit retention policy. Storage backends may compact more
/// aggressively but must preserve the last terminal audit row per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuditLevel {
    /// Keep every status/run/log row.
    #[default]
    Full,
    /// Keep status and run audits, drop execution logs once terminal.
    Minimal,
    /// Keep only the last terminal audit per task.
    TerminalOnly,
}

/// The stored unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub request_type: String,
    pub handler_type: String,
    /// Opaque payload carrying the serialized request (JSON by default).
    pub payload: Vec<u8>,
    pub status: TaskStatus,
    pub queue_name: String,
    pub task_key: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub last_execution_utc: Option<DateTime<Utc>>,
    pub scheduled_execution_utc: Option<DateTime<Utc>>,
    pub next_run_utc: Option<DateTime<Utc>>,
    pub execution_time_ms: f64,
    pub exception: Option<String>,
    pub is_recurring: bool,
    pub recurring_rule: Option<RecurringRule>,
    pub recurring_info: Option<String>,
    pub current_run_count: Option<u32>,
    pub max_runs: Option<u32>,
    pub run_until: Option<DateTime<Utc>>,
    pub audit_level: Option<AuditLevel>,
}

impl Task {
    /// Builds a brand-new one-shot task row. The caller fills in scheduling
    /// fields afterwards (delay/recurring) before it is persisted.
    pub fn new(
        request_type: impl Into<String>,
        handler_type: impl Into<String>,
        payload: Vec<u8>,
        queue_name: impl Into<String>,
        task_key: Option<String>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            request_type: request_type.into(),
            handler_type: handler_type.into(),
            payload,
            status: TaskStatus::WaitingQueue,
            queue_name: queue_name.into(),
            task_key,
            created_at_utc: Utc::now(),
            last_execution_utc: None,
            scheduled_execution_utc: None,
            next_run_utc: None,
            execution_time_ms: 0.0,
            exception: None,
            is_recurring: false,
            recurring_rule: None,
            recurring_info: None,
            current_run_count: None,
            max_runs: None,
            run_until: None,
            audit_level: None,
        }
    }
}

/// Append-only record of a single status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusAudit {
    pub id: Uuid,
    pub task_id: TaskId,
    pub updated_at_utc: DateTime<Utc>,
    pub new_status: TaskStatus,
    pub exception: Option<String>,
}

/// Append-only record of a single handler invocation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAudit {
    pub id: Uuid,
    pub task_id: TaskId,
    pub executed_at: DateTime<Utc>,
    pub execution_time_ms: f64,
    pub status: TaskStatus,
    pub exception: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Append-only record captured by the per-task log sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub task_id: TaskId,
    pub timestamp_utc: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub exception_details: Option<String>,
    pub sequence_number: u64,
}
