//! SQLite-backed `PersistentStore`: WAL mode, a single lazily opened
//! connection, and idempotent `CREATE TABLE IF NOT EXISTS` /
//! `CREATE INDEX IF NOT EXISTS` schema creation.

mod schema;

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evertask_core::store::TaskDetail;
use evertask_core::{
    schedule::RecurringRule, AuditLevel, ExecutionLog, LogLevel, PersistentStore, RunAudit, StatusAudit, Task, TaskId,
    TaskStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

/// Opens (creating if needed) a SQLite database at `db_path` and keeps a
/// single connection alive for the store's lifetime.
pub struct SqliteStore {
    db_path: PathBuf,
    busy_timeout: Duration,
    connection: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>, busy_timeout: Duration) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let connection = Self::open_connection(&db_path, busy_timeout)?;
        schema::create_tables(&connection).context("failed to create evertask schema")?;
        Ok(Self {
            db_path,
            busy_timeout,
            connection: Mutex::new(connection),
        })
    }

    fn open_connection(db_path: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
        let conn = Connection::open(db_path).with_context(|| format!("failed to open {}", db_path.display()))?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "wal_autocheckpoint", 1000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Forces a WAL checkpoint, truncating the `-wal` file back to zero bytes.
    pub fn checkpoint_wal(&self) -> anyhow::Result<()> {
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        conn.pragma_update(None, "wal_checkpoint", "TRUNCATE")?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

fn status_to_text(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::WaitingQueue => "WaitingQueue",
        TaskStatus::Queued => "Queued",
        TaskStatus::InProgress => "InProgress",
        TaskStatus::Pending => "Pending",
        TaskStatus::Cancelled => "Cancelled",
        TaskStatus::Completed => "Completed",
        TaskStatus::Failed => "Failed",
        TaskStatus::ServiceStopped => "ServiceStopped",
    }
}

fn status_from_text(text: &str) -> anyhow::Result<TaskStatus> {
    Ok(match text {
        "WaitingQueue" => TaskStatus::WaitingQueue,
        "Queued" => TaskStatus::Queued,
        "InProgress" => TaskStatus::InProgress,
        "Pending" => TaskStatus::Pending,
        "Cancelled" => TaskStatus::Cancelled,
        "Completed" => TaskStatus::Completed,
        "Failed" => TaskStatus::Failed,
        "ServiceStopped" => TaskStatus::ServiceStopped,
        other => anyhow::bail!("unknown task status {other:?} in sqlite row"),
    })
}

fn level_to_text(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "Trace",
        LogLevel::Debug => "Debug",
        LogLevel::Info => "Info",
        LogLevel::Warn => "Warn",
        LogLevel::Error => "Error",
    }
}

fn level_from_text(text: &str) -> anyhow::Result<LogLevel> {
    Ok(match text {
        "Trace" => LogLevel::Trace,
        "Debug" => LogLevel::Debug,
        "Info" => LogLevel::Info,
        "Warn" => LogLevel::Warn,
        "Error" => LogLevel::Error,
        other => anyhow::bail!("unknown log level {other:?} in sqlite row"),
    })
}

fn audit_level_to_text(level: AuditLevel) -> &'static str {
    match level {
        AuditLevel::Full => "Full",
        AuditLevel::Minimal => "Minimal",
        AuditLevel::TerminalOnly => "TerminalOnly",
    }
}

fn audit_level_from_text(text: &str) -> anyhow::Result<AuditLevel> {
    Ok(match text {
        "Full" => AuditLevel::Full,
        "Minimal" => AuditLevel::Minimal,
        "TerminalOnly" => AuditLevel::TerminalOnly,
        other => anyhow::bail!("unknown audit level {other:?} in sqlite row"),
    })
}

fn to_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn from_rfc3339(text: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}

fn task_to_row_params(task: &Task) -> anyhow::Result<TaskRowParams> {
    Ok(TaskRowParams {
        id: task.id.0.to_string(),
        request_type: task.request_type.clone(),
        handler_type: task.handler_type.clone(),
        payload: task.payload.clone(),
        status: status_to_text(task.status).to_string(),
        queue_name: task.queue_name.clone(),
        task_key: task.task_key.clone(),
        created_at_utc: to_rfc3339(task.created_at_utc),
        last_execution_utc: task.last_execution_utc.map(to_rfc3339),
        scheduled_execution_utc: task.scheduled_execution_utc.map(to_rfc3339),
        next_run_utc: task.next_run_utc.map(to_rfc3339),
        execution_time_ms: task.execution_time_ms,
        exception: task.exception.clone(),
        is_recurring: task.is_recurring,
        recurring_rule: task
            .recurring_rule
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("failed to serialize recurring rule")?,
        recurring_info: task.recurring_info.clone(),
        current_run_count: task.current_run_count,
        max_runs: task.max_runs,
        run_until: task.run_until.map(to_rfc3339),
        audit_level: task.audit_level.map(audit_level_to_text).map(str::to_string),
    })
}

struct TaskRowParams {
    id: String,
    request_type: String,
    handler_type: String,
    payload: Vec<u8>,
    status: String,
    queue_name: String,
    task_key: Option<String>,
    created_at_utc: String,
    last_execution_utc: Option<String>,
    scheduled_execution_utc: Option<String>,
    next_run_utc: Option<String>,
    execution_time_ms: f64,
    exception: Option<String>,
    is_recurring: bool,
    recurring_rule: Option<String>,
    recurring_info: Option<String>,
    current_run_count: Option<u32>,
    max_runs: Option<u32>,
    run_until: Option<String>,
    audit_level: Option<String>,
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let id_text: String = row.get("id")?;
    let status_text: String = row.get("status")?;
    let recurring_rule_text: Option<String> = row.get("recurring_rule")?;
    let audit_level_text: Option<String> = row.get("audit_level")?;
    let created_at_text: String = row.get("created_at_utc")?;
    let last_execution_text: Option<String> = row.get("last_execution_utc")?;
    let scheduled_execution_text: Option<String> = row.get("scheduled_execution_utc")?;
    let next_run_text: Option<String> = row.get("next_run_utc")?;
    let run_until_text: Option<String> = row.get("run_until")?;

    let to_sqlite_err = |e: anyhow::Error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into());

    Ok(Task {
        id: TaskId(Uuid::parse_str(&id_text).map_err(|e| to_sqlite_err(e.into()))?),
        request_type: row.get("request_type")?,
        handler_type: row.get("handler_type")?,
        payload: row.get("payload")?,
        status: status_from_text(&status_text).map_err(to_sqlite_err)?,
        queue_name: row.get("queue_name")?,
        task_key: row.get("task_key")?,
        created_at_utc: from_rfc3339(&created_at_text).map_err(to_sqlite_err)?,
        last_execution_utc: last_execution_text.map(|t| from_rfc3339(&t)).transpose().map_err(to_sqlite_err)?,
        scheduled_execution_utc: scheduled_execution_text
            .map(|t| from_rfc3339(&t))
            .transpose()
            .map_err(to_sqlite_err)?,
        next_run_utc: next_run_text.map(|t| from_rfc3339(&t)).transpose().map_err(to_sqlite_err)?,
        execution_time_ms: row.get("execution_time_ms")?,
        exception: row.get("exception")?,
        is_recurring: row.get("is_recurring")?,
        recurring_rule: recurring_rule_text
            .map(|t| serde_json::from_str::<RecurringRule>(&t))
            .transpose()
            .map_err(|e| to_sqlite_err(e.into()))?,
        recurring_info: row.get("recurring_info")?,
        current_run_count: row.get("current_run_count")?,
        max_runs: row.get("max_runs")?,
        run_until: run_until_text.map(|t| from_rfc3339(&t)).transpose().map_err(to_sqlite_err)?,
        audit_level: audit_level_text
            .map(|t| audit_level_from_text(&t))
            .transpose()
            .map_err(to_sqlite_err)?,
    })
}

fn row_to_status_audit(row: &Row) -> rusqlite::Result<StatusAudit> {
    let id_text: String = row.get("id")?;
    let task_id_text: String = row.get("task_id")?;
    let new_status_text: String = row.get("new_status")?;
    let updated_at_text: String = row.get("updated_at_utc")?;
    let to_sqlite_err = |e: anyhow::Error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into());
    Ok(StatusAudit {
        id: Uuid::parse_str(&id_text).map_err(|e| to_sqlite_err(e.into()))?,
        task_id: TaskId(Uuid::parse_str(&task_id_text).map_err(|e| to_sqlite_err(e.into()))?),
        updated_at_utc: from_rfc3339(&updated_at_text).map_err(to_sqlite_err)?,
        new_status: status_from_text(&new_status_text).map_err(to_sqlite_err)?,
        exception: row.get("exception")?,
    })
}

fn row_to_run_audit(row: &Row) -> rusqlite::Result<RunAudit> {
    let id_text: String = row.get("id")?;
    let task_id_text: String = row.get("task_id")?;
    let status_text: String = row.get("status")?;
    let executed_at_text: String = row.get("executed_at")?;
    let to_sqlite_err = |e: anyhow::Error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into());
    Ok(RunAudit {
        id: Uuid::parse_str(&id_text).map_err(|e| to_sqlite_err(e.into()))?,
        task_id: TaskId(Uuid::parse_str(&task_id_text).map_err(|e| to_sqlite_err(e.into()))?),
        executed_at: from_rfc3339(&executed_at_text).map_err(to_sqlite_err)?,
        execution_time_ms: row.get("execution_time_ms")?,
        status: status_from_text(&status_text).map_err(to_sqlite_err)?,
        exception: row.get("exception")?,
    })
}

fn row_to_execution_log(row: &Row) -> rusqlite::Result<ExecutionLog> {
    let id_text: String = row.get("id")?;
    let task_id_text: String = row.get("task_id")?;
    let level_text: String = row.get("level")?;
    let timestamp_text: String = row.get("timestamp_utc")?;
    let to_sqlite_err = |e: anyhow::Error| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into());
    Ok(ExecutionLog {
        id: Uuid::parse_str(&id_text).map_err(|e| to_sqlite_err(e.into()))?,
        task_id: TaskId(Uuid::parse_str(&task_id_text).map_err(|e| to_sqlite_err(e.into()))?),
        timestamp_utc: from_rfc3339(&timestamp_text).map_err(to_sqlite_err)?,
        level: level_from_text(&level_text).map_err(to_sqlite_err)?,
        message: row.get("message")?,
        exception_details: row.get("exception_details")?,
        sequence_number: row.get::<_, i64>("sequence_number")? as u64,
    })
}

fn upsert_task(conn: &Connection, task: &Task) -> anyhow::Result<()> {
    let p = task_to_row_params(task)?;
    conn.execute(
        "INSERT INTO tasks (
            id, request_type, handler_type, payload, status, queue_name, task_key,
            created_at_utc, last_execution_utc, scheduled_execution_utc, next_run_utc,
            execution_time_ms, exception, is_recurring, recurring_rule, recurring_info,
            current_run_count, max_runs, run_until, audit_level
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)
        ON CONFLICT(id) DO UPDATE SET
            request_type = excluded.request_type,
            handler_type = excluded.handler_type,
            payload = excluded.payload,
            status = excluded.status,
            queue_name = excluded.queue_name,
            task_key = excluded.task_key,
            last_execution_utc = excluded.last_execution_utc,
            scheduled_execution_utc = excluded.scheduled_execution_utc,
            next_run_utc = excluded.next_run_utc,
            execution_time_ms = excluded.execution_time_ms,
            exception = excluded.exception,
            is_recurring = excluded.is_recurring,
            recurring_rule = excluded.recurring_rule,
            recurring_info = excluded.recurring_info,
            current_run_count = excluded.current_run_count,
            max_runs = excluded.max_runs,
            run_until = excluded.run_until,
            audit_level = excluded.audit_level",
        params![
            p.id,
            p.request_type,
            p.handler_type,
            p.payload,
            p.status,
            p.queue_name,
            p.task_key,
            p.created_at_utc,
            p.last_execution_utc,
            p.scheduled_execution_utc,
            p.next_run_utc,
            p.execution_time_ms,
            p.exception,
            p.is_recurring,
            p.recurring_rule,
            p.recurring_info,
            p.current_run_count,
            p.max_runs,
            p.run_until,
            p.audit_level,
        ],
    )
    .context("failed to upsert task row")?;
    Ok(())
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn persist(&self, task: &Task) -> anyhow::Result<()> {
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        upsert_task(&conn, task)
    }

    async fn update_task(&self, task: &Task) -> anyhow::Result<()> {
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        upsert_task(&conn, task)
    }

    async fn remove(&self, id: TaskId) -> anyhow::Result<()> {
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        let id_text = id.0.to_string();
        conn.execute("DELETE FROM execution_logs WHERE task_id = ?1", params![id_text])?;
        conn.execute("DELETE FROM runs_audit WHERE task_id = ?1", params![id_text])?;
        conn.execute("DELETE FROM status_audit WHERE task_id = ?1", params![id_text])?;
        conn.execute("DELETE FROM tasks WHERE id = ?1", params![id_text])?;
        Ok(())
    }

    async fn get_by_task_key(&self, key: &str) -> anyhow::Result<Option<Task>> {
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        let task = conn
            .query_row(
                "SELECT * FROM tasks WHERE task_key = ?1
                 AND status NOT IN ('Completed','Failed','Cancelled','ServiceStopped')
                 LIMIT 1",
                params![key],
                row_to_task,
            )
            .optional()
            .context("failed to query task by task_key")?;
        Ok(task)
    }

    async fn get_pending_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks
             WHERE status IN ('WaitingQueue','Queued','InProgress','Pending')
             ORDER BY created_at_utc ASC",
        )?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<Result<Vec<_>, _>>()
            .context("failed to load pending tasks")?;
        Ok(tasks)
    }

    async fn set_cancelled_by_user(&self, id: TaskId) -> anyhow::Result<()> {
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        let id_text = id.0.to_string();
        let updated = conn.execute(
            "UPDATE tasks SET status = 'Cancelled'
             WHERE id = ?1 AND status NOT IN ('Completed','Failed','Cancelled','ServiceStopped')",
            params![id_text],
        )?;
        if updated > 0 {
            insert_status_audit(&conn, id, TaskStatus::Cancelled, None)?;
        }
        Ok(())
    }

    async fn set_status(&self, id: TaskId, new_status: TaskStatus, exception: Option<String>) -> anyhow::Result<()> {
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        let id_text = id.0.to_string();
        conn.execute(
            "UPDATE tasks SET status = ?2, exception = ?3 WHERE id = ?1",
            params![id_text, status_to_text(new_status), exception],
        )?;
        insert_status_audit(&conn, id, new_status, exception)?;
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
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        conn.execute(
            "INSERT INTO runs_audit (id, task_id, executed_at, execution_time_ms, status, exception)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                Uuid::new_v4().to_string(),
                id.0.to_string(),
                to_rfc3339(executed_at),
                execution_time_ms,
                status_to_text(status),
                exception,
            ],
        )
        .context("failed to insert run audit row")?;
        Ok(())
    }

    async fn append_logs(&self, id: TaskId, logs: &[ExecutionLog]) -> anyhow::Result<()> {
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        for log in logs {
            conn.execute(
                "INSERT INTO execution_logs (id, task_id, timestamp_utc, level, message, exception_details, sequence_number)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![
                    log.id.to_string(),
                    id.0.to_string(),
                    to_rfc3339(log.timestamp_utc),
                    level_to_text(log.level),
                    log.message,
                    log.exception_details,
                    log.sequence_number as i64,
                ],
            )
            .context("failed to insert execution log row")?;
        }
        Ok(())
    }

    async fn get_detail(&self, id: TaskId) -> anyhow::Result<Option<TaskDetail>> {
        let conn = self.connection.lock().expect("sqlite connection mutex poisoned");
        let id_text = id.0.to_string();
        let task = conn
            .query_row("SELECT * FROM tasks WHERE id = ?1", params![id_text], row_to_task)
            .optional()
            .context("failed to load task for detail")?;
        let Some(task) = task else {
            return Ok(None);
        };

        let mut status_stmt = conn.prepare("SELECT * FROM status_audit WHERE task_id = ?1 ORDER BY updated_at_utc ASC")?;
        let status_audits = status_stmt
            .query_map(params![id_text], row_to_status_audit)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut run_stmt = conn.prepare("SELECT * FROM runs_audit WHERE task_id = ?1 ORDER BY executed_at ASC")?;
        let run_audits = run_stmt.query_map(params![id_text], row_to_run_audit)?.collect::<Result<Vec<_>, _>>()?;

        let mut log_stmt = conn.prepare("SELECT * FROM execution_logs WHERE task_id = ?1 ORDER BY sequence_number ASC")?;
        let logs = log_stmt
            .query_map(params![id_text], row_to_execution_log)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(TaskDetail {
            task,
            status_audits,
            run_audits,
            logs,
        }))
    }
}

fn insert_status_audit(conn: &Connection, id: TaskId, new_status: TaskStatus, exception: Option<String>) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO status_audit (id, task_id, updated_at_utc, new_status, exception) VALUES (?1,?2,?3,?4,?5)",
        params![
            Uuid::new_v4().to_string(),
            id.0.to_string(),
            to_rfc3339(Utc::now()),
            status_to_text(new_status),
            exception,
        ],
    )
    .context("failed to insert status audit row")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evertask_core::Task as CoreTask;

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evertask.db");
        let store = SqliteStore::open(&path, Duration::from_secs(5)).unwrap();
        (dir, store)
    }

    fn sample_task() -> CoreTask {
        CoreTask::new("req", "handler", vec![1, 2, 3], "default", None)
    }

    #[tokio::test]
    async fn persist_then_get_pending_round_trips() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        let id = task.id;
        store.persist(&task).await.unwrap();

        let pending = store.get_pending_tasks().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].payload, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn task_key_lookup_ignores_terminal_rows() {
        let (_dir, store) = temp_store();
        let mut task = sample_task();
        task.task_key = Some("unique-key".to_string());
        let id = task.id;
        store.persist(&task).await.unwrap();
        assert!(store.get_by_task_key("unique-key").await.unwrap().is_some());

        store.set_status(id, TaskStatus::Completed, None).await.unwrap();
        assert!(store.get_by_task_key("unique-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_task_key_insert_is_rejected_while_active() {
        let (_dir, store) = temp_store();
        let mut first = sample_task();
        first.task_key = Some("dedup".to_string());
        store.persist(&first).await.unwrap();

        let mut second = sample_task();
        second.task_key = Some("dedup".to_string());
        let err = store.persist(&second).await;
        assert!(err.is_err(), "unique partial index should reject a second active taskKey");
    }

    #[tokio::test]
    async fn set_status_appends_audit_row_and_detail_reflects_it() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        let id = task.id;
        store.persist(&task).await.unwrap();
        store.set_status(id, TaskStatus::InProgress, None).await.unwrap();

        let detail = store.get_detail(id).await.unwrap().unwrap();
        assert_eq!(detail.task.status, TaskStatus::InProgress);
        assert_eq!(detail.status_audits.len(), 1);
        assert_eq!(detail.status_audits[0].new_status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn record_run_and_append_logs_are_queryable_via_detail() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        let id = task.id;
        store.persist(&task).await.unwrap();
        store
            .record_run(id, Utc::now(), 12.5, TaskStatus::Completed, None)
            .await
            .unwrap();
        store
            .append_logs(
                id,
                &[ExecutionLog {
                    id: Uuid::new_v4(),
                    task_id: id,
                    timestamp_utc: Utc::now(),
                    level: LogLevel::Info,
                    message: "did the thing".to_string(),
                    exception_details: None,
                    sequence_number: 0,
                }],
            )
            .await
            .unwrap();

        let detail = store.get_detail(id).await.unwrap().unwrap();
        assert_eq!(detail.run_audits.len(), 1);
        assert_eq!(detail.logs.len(), 1);
        assert_eq!(detail.logs[0].message, "did the thing");
    }

    #[tokio::test]
    async fn remove_clears_task_and_its_audit_rows() {
        let (_dir, store) = temp_store();
        let task = sample_task();
        let id = task.id;
        store.persist(&task).await.unwrap();
        store.set_status(id, TaskStatus::Completed, None).await.unwrap();
        store.remove(id).await.unwrap();
        assert!(store.get_detail(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reopening_the_same_path_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evertask.db");
        {
            let store = SqliteStore::open(&path, Duration::from_secs(5)).unwrap();
            store.persist(&sample_task()).await.unwrap();
        }
        let store = SqliteStore::open(&path, Duration::from_secs(5)).unwrap();
        assert_eq!(store.get_pending_tasks().await.unwrap().len(), 1);
    }
}
