//! The persistence contract. Any backend — in-memory, relational, key-value
//! — implements this trait; the engine never talks to a backend directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::task::{ExecutionLog, RunAudit, Task, TaskId, TaskStatus};

/// A task plus its full audit trail, for monitoring.
#[derive(Debug, Clone)]
pub struct TaskDetail {
    pub task: Task,
    pub status_audits: Vec<crate::task::StatusAudit>,
    pub run_audits: Vec<RunAudit>,
    pub logs: Vec<ExecutionLog>,
}

/// CRUD over tasks, status/run audits, and execution logs.
///
/// Implementations MUST make `set_status` and `record_run` linearizable per
/// task id; a backend without transactions emulates this with
/// single-writer discipline per id.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn persist(&self, task: &Task) -> anyhow::Result<()>;

    async fn update_task(&self, task: &Task) -> anyhow::Result<()>;

    async fn remove(&self, id: TaskId) -> anyhow::Result<()>;

    /// Exact match; returns at most one row, and only if its status is
    /// non-terminal.
    async fn get_by_task_key(&self, key: &str) -> anyhow::Result<Option<Task>>;

    /// All rows with status in {WaitingQueue, Queued, InProgress, Pending},
    /// ordered by creation — used at boot recovery.
    async fn get_pending_tasks(&self) -> anyhow::Result<Vec<Task>>;

    /// Idempotent transition to Cancelled.
    async fn set_cancelled_by_user(&self, id: TaskId) -> anyhow::Result<()>;

    /// Writes the new status and a StatusAudit row atomically.
    async fn set_status(
        &self,
        id: TaskId,
        new_status: TaskStatus,
        exception: Option<String>,
    ) -> anyhow::Result<()>;

    /// Writes a RunAudit row for one handler invocation attempt.
    async fn record_run(
        &self,
        id: TaskId,
        executed_at: DateTime<Utc>,
        execution_time_ms: f64,
        status: TaskStatus,
        exception: Option<String>,
    ) -> anyhow::Result<()>;

    async fn append_logs(&self, id: TaskId, logs: &[ExecutionLog]) -> anyhow::Result<()>;

    async fn get_detail(&self, id: TaskId) -> anyhow::Result<Option<TaskDetail>>;
}
