//! In-memory reference [`PersistentStore`], for tests and embedding. Not
//! durable — a process restart loses every row — but otherwise honors the
//! same atomicity and query contract as a real backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evertask_core::store::TaskDetail;
use evertask_core::{ExecutionLog, PersistentStore, RunAudit, StatusAudit, Task, TaskId, TaskStatus};
use uuid::Uuid;

#[derive(Default)]
struct Rows {
    tasks: HashMap<TaskId, Task>,
    status_audits: HashMap<TaskId, Vec<StatusAudit>>,
    run_audits: HashMap<TaskId, Vec<RunAudit>>,
    logs: HashMap<TaskId, Vec<ExecutionLog>>,
}

pub struct MemoryStore {
    rows: Mutex<Rows>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Rows::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn pending_status(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::WaitingQueue | TaskStatus::Queued | TaskStatus::InProgress | TaskStatus::Pending
    )
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn persist(&self, task: &Task) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().expect("memory store mutex poisoned");
        rows.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().expect("memory store mutex poisoned");
        rows.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn remove(&self, id: TaskId) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().expect("memory store mutex poisoned");
        rows.tasks.remove(&id);
        rows.status_audits.remove(&id);
        rows.run_audits.remove(&id);
        rows.logs.remove(&id);
        Ok(())
    }

    async fn get_by_task_key(&self, key: &str) -> anyhow::Result<Option<Task>> {
        let rows = self.rows.lock().expect("memory store mutex poisoned");
        Ok(rows
            .tasks
            .values()
            .find(|task| task.task_key.as_deref() == Some(key) && !task.status.is_terminal())
            .cloned())
    }

    async fn get_pending_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let rows = self.rows.lock().expect("memory store mutex poisoned");
        let mut pending: Vec<Task> = rows
            .tasks
            .values()
            .filter(|task| pending_status(task.status))
            .cloned()
            .collect();
        pending.sort_by_key(|task| task.created_at_utc);
        Ok(pending)
    }

    async fn set_cancelled_by_user(&self, id: TaskId) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().expect("memory store mutex poisoned");
        if let Some(task) = rows.tasks.get(&id) {
            if task.status.is_terminal() {
                return Ok(());
            }
        }
        write_status(&mut rows, id, TaskStatus::Cancelled, None);
        Ok(())
    }

    async fn set_status(&self, id: TaskId, new_status: TaskStatus, exception: Option<String>) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().expect("memory store mutex poisoned");
        write_status(&mut rows, id, new_status, exception);
        Ok(())
    }

    async fn record_run(
        &self,
        id: TaskId,
        executed_at: DateTime<Utc>,
        execution_time_ms: f64,
        status: TaskStatus,
        exception: Option<String>,
    ) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().expect("memory store mutex poisoned");
        rows.run_audits.entry(id).or_default().push(RunAudit {
            id: Uuid::new_v4(),
            task_id: id,
            executed_at,
            execution_time_ms,
            status,
            exception,
        });
        Ok(())
    }

    async fn append_logs(&self, id: TaskId, logs: &[ExecutionLog]) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().expect("memory store mutex poisoned");
        rows.logs.entry(id).or_default().extend_from_slice(logs);
        Ok(())
    }

    async fn get_detail(&self, id: TaskId) -> anyhow::Result<Option<TaskDetail>> {
        let rows = self.rows.lock().expect("memory store mutex poisoned");
        let Some(task) = rows.tasks.get(&id).cloned() else {
            return Ok(None);
        };
        Ok(Some(TaskDetail {
            task,
            status_audits: rows.status_audits.get(&id).cloned().unwrap_or_default(),
            run_audits: rows.run_audits.get(&id).cloned().unwrap_or_default(),
            logs: rows.logs.get(&id).cloned().unwrap_or_default(),
        }))
    }
}

fn write_status(rows: &mut Rows, id: TaskId, new_status: TaskStatus, exception: Option<String>) {
    if let Some(task) = rows.tasks.get_mut(&id) {
        task.status = new_status;
        task.exception = exception.clone();
    }
    rows.status_audits.entry(id).or_default().push(StatusAudit {
        id: Uuid::new_v4(),
        task_id: id,
        updated_at_utc: Utc::now(),
        new_status,
        exception,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task::new("req", "handler", vec![], "default", None)
    }

    #[tokio::test]
    async fn persist_then_get_pending() {
        let store = MemoryStore::new();
        let task = sample_task();
        let id = task.id;
        store.persist(&task).await.unwrap();
        let pending = store.get_pending_tasks().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[tokio::test]
    async fn task_key_lookup_ignores_terminal_rows() {
        let store = MemoryStore::new();
        let mut task = sample_task();
        task.task_key = Some("unique-key".to_string());
        let id = task.id;
        store.persist(&task).await.unwrap();
        assert!(store.get_by_task_key("unique-key").await.unwrap().is_some());

        store.set_status(id, TaskStatus::Completed, None).await.unwrap();
        assert!(store.get_by_task_key("unique-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_status_appends_audit_row() {
        let store = MemoryStore::new();
        let task = sample_task();
        let id = task.id;
        store.persist(&task).await.unwrap();
        store.set_status(id, TaskStatus::InProgress, None).await.unwrap();
        let detail = store.get_detail(id).await.unwrap().unwrap();
        assert_eq!(detail.status_audits.len(), 1);
        assert_eq!(detail.task.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_once_terminal() {
        let store = MemoryStore::new();
        let task = sample_task();
        let id = task.id;
        store.persist(&task).await.unwrap();
        store.set_status(id, TaskStatus::Completed, None).await.unwrap();
        store.set_cancelled_by_user(id).await.unwrap();
        let detail = store.get_detail(id).await.unwrap().unwrap();
        assert_eq!(detail.task.status, TaskStatus::Completed);
    }
}
