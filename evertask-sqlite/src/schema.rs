//! Idempotent table/index creation, one `CREATE TABLE IF NOT EXISTS` per
//! concern.

use anyhow::Context;
use rusqlite::Connection;

pub fn create_tables(conn: &Connection) -> anyhow::Result<()> {
    create_tasks_table(conn)?;
    create_status_audit_table(conn)?;
    create_runs_audit_table(conn)?;
    create_execution_logs_table(conn)?;
    Ok(())
}

fn create_tasks_table(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tasks (
            id                      TEXT PRIMARY KEY,
            request_type            TEXT NOT NULL,
            handler_type             TEXT NOT NULL,
            payload                 BLOB NOT NULL,
            status                  TEXT NOT NULL,
            queue_name              TEXT NOT NULL,
            task_key                TEXT,
            created_at_utc          TEXT NOT NULL,
            last_execution_utc      TEXT,
            scheduled_execution_utc TEXT,
            next_run_utc            TEXT,
            execution_time_ms       REAL NOT NULL DEFAULT 0,
            exception               TEXT,
            is_recurring            INTEGER NOT NULL DEFAULT 0,
            recurring_rule          TEXT,
            recurring_info          TEXT,
            current_run_count       INTEGER,
            max_runs                INTEGER,
            run_until               TEXT,
            audit_level             TEXT
        )",
        [],
    )
    .context("failed to create tasks table")?;

    // Only one active (non-terminal) row may claim a given taskKey (spec's
    // idempotent re-dispatch invariant).
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_task_key_active
         ON tasks(task_key)
         WHERE task_key IS NOT NULL
           AND status NOT IN ('Completed','Failed','Cancelled','ServiceStopped')",
        [],
    )
    .context("failed to create tasks.task_key partial unique index")?;

    conn.execute("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)", [])
        .context("failed to create tasks.status index")?;

    Ok(())
}

fn create_status_audit_table(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS status_audit (
            id              TEXT PRIMARY KEY,
            task_id         TEXT NOT NULL,
            updated_at_utc  TEXT NOT NULL,
            new_status      TEXT NOT NULL,
            exception       TEXT
        )",
        [],
    )
    .context("failed to create status_audit table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_status_audit_task_id ON status_audit(task_id)",
        [],
    )
    .context("failed to create status_audit.task_id index")?;

    Ok(())
}

fn create_runs_audit_table(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs_audit (
            id                  TEXT PRIMARY KEY,
            task_id             TEXT NOT NULL,
            executed_at         TEXT NOT NULL,
            execution_time_ms   REAL NOT NULL,
            status              TEXT NOT NULL,
            exception           TEXT
        )",
        [],
    )
    .context("failed to create runs_audit table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_runs_audit_task_id ON runs_audit(task_id)",
        [],
    )
    .context("failed to create runs_audit.task_id index")?;

    Ok(())
}

fn create_execution_logs_table(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS execution_logs (
            id                  TEXT PRIMARY KEY,
            task_id             TEXT NOT NULL,
            timestamp_utc       TEXT NOT NULL,
            level               TEXT NOT NULL,
            message             TEXT NOT NULL,
            exception_details   TEXT,
            sequence_number     INTEGER NOT NULL
        )",
        [],
    )
    .context("failed to create execution_logs table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_execution_logs_task_id_timestamp
         ON execution_logs(task_id, timestamp_utc)",
        [],
    )
    .context("failed to create execution_logs(task_id, timestamp_utc) index")?;

    Ok(())
}
