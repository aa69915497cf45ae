//! Worker pool: for each queue, `N = maxDegreeOfParallelism` cooperating
//! consumers race on a single source. Each consumer is a long-lived spawned
//! task pulling from the shared queue receiver, rather than a fresh task
//! spawned per tick.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use evertask_core::{
    schedule::evaluate_next_run, EventBus, HandlerOutcome, LogLevel, PersistentStore, Task, TaskEvent, TaskId,
    TaskStatus,
};
use tokio::task::JoinHandle;
use tracing::{instrument, warn};

use crate::cancellation::CancellationRegistry;
use crate::executor::Executor;
use crate::log_capture::LogCapture;
use crate::queue::WorkerQueue;
use crate::queue_manager::QueueManager;
use crate::scheduler::ScheduleHandle;

/// Mid-execution status/run-audit writes get a few bounded retries against
/// the store before the failure is logged and swallowed — a write here must
/// never propagate back to the handler or the producer.
const STATUS_WRITE_RETRIES: u32 = 3;
const STATUS_WRITE_BACKOFF: Duration = Duration::from_millis(50);

async fn write_with_retry<F, Fut>(task_id: TaskId, what: &str, mut attempt: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    for try_n in 1..=STATUS_WRITE_RETRIES {
        match attempt().await {
            Ok(()) => return,
            Err(e) if try_n < STATUS_WRITE_RETRIES => {
                warn!(task_id = %task_id, attempt = try_n, error = %e, "{what} failed, retrying");
                tokio::time::sleep(STATUS_WRITE_BACKOFF).await;
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "{what} failed after {STATUS_WRITE_RETRIES} attempts, continuing without it");
            }
        }
    }
}

/// Shared dependencies every consumer task needs; cloned (cheaply, via
/// `Arc`s) into each spawned consumer.
#[derive(Clone)]
pub struct WorkerPoolContext {
    pub store: Arc<dyn PersistentStore>,
    pub event_bus: Arc<dyn EventBus>,
    pub cancellation: Arc<CancellationRegistry>,
    pub schedule_handle: ScheduleHandle,
    pub queue_manager: Arc<QueueManager>,
    pub min_persist_level: LogLevel,
    pub max_persisted_logs: usize,
}

/// Spawns `queue.max_degree_of_parallelism` consumer tasks over `queue`.
/// Returns their join handles so the host can await shutdown.
pub fn spawn_consumers(queue: Arc<WorkerQueue>, ctx: WorkerPoolContext) -> Vec<JoinHandle<()>> {
    (0..queue.max_degree_of_parallelism)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let ctx = ctx.clone();
            tokio::spawn(async move { consumer_loop(queue, ctx).await })
        })
        .collect()
}

async fn consumer_loop(queue: Arc<WorkerQueue>, ctx: WorkerPoolContext) {
    loop {
        let marker = TaskId::new();
        match queue.dequeue(marker).await {
            Some(executor) => process_one(executor, &queue, &ctx).await,
            None => return, // queue closed: pool is shutting down
        }
    }
}

#[instrument(skip_all, fields(task_id = %executor.task.id))]
async fn process_one(executor: Executor, queue: &WorkerQueue, ctx: &WorkerPoolContext) {
    let Executor { mut task, handler } = executor;
    let id = task.id;

    // Step 1: blacklist check — a cancel may have raced ahead of dequeue.
    if ctx.cancellation.is_blacklisted(id) {
        write_with_retry(id, "blacklisted-cancel status write", || {
            ctx.store.set_status(id, TaskStatus::Cancelled, None)
        })
        .await;
        ctx.cancellation.clear_blacklist(id);
        ctx.event_bus
            .publish(TaskEvent::StatusChanged {
                task_id: id,
                status: TaskStatus::Cancelled,
                queue_name: task.queue_name.clone(),
            })
            .await;
        return;
    }

    let Some(handler) = handler else {
        warn!(task_id = %id, "no handler bound to dequeued task, marking ServiceStopped");
        write_with_retry(id, "ServiceStopped status write", || {
            ctx.store.set_status(id, TaskStatus::ServiceStopped, None)
        })
        .await;
        return;
    };

    // Step 2: InProgress transition.
    write_with_retry(id, "InProgress status write", || ctx.store.set_status(id, TaskStatus::InProgress, None)).await;
    ctx.event_bus
        .publish(TaskEvent::StatusChanged {
            task_id: id,
            status: TaskStatus::InProgress,
            queue_name: task.queue_name.clone(),
        })
        .await;

    // Step 3: cancellation handle + effective timeout.
    let cancel_token = ctx.cancellation.register(id);
    let effective_timeout = handler.capabilities().timeout.or(queue.default_timeout);
    let retry_policy = handler.capabilities().retry_policy.unwrap_or_default();

    handler.on_started(id).await;

    let log_capture = LogCapture::new(id, ctx.min_persist_level, ctx.max_persisted_logs);
    let started_at = Utc::now();
    let mut attempt: u32 = 1;

    let outcome = loop {
        log_capture.log(LogLevel::Info, || format!("invocation attempt {attempt} started"));
        let attempt_outcome = invoke_with_timeout(&*handler, &task.payload, cancel_token.clone(), effective_timeout).await;

        match &attempt_outcome {
            HandlerOutcome::Success => {
                log_capture.log(LogLevel::Info, || "invocation succeeded".to_string());
                break attempt_outcome;
            }
            HandlerOutcome::Cancelled => {
                log_capture.log(LogLevel::Warn, || "invocation cancelled".to_string());
                write_with_retry(id, "run audit write", || {
                    ctx.store
                        .record_run(id, Utc::now(), elapsed_ms(started_at), TaskStatus::Cancelled, None)
                })
                .await;
                break attempt_outcome;
            }
            HandlerOutcome::Timeout => {
                log_capture.log_error(|| format!("attempt {attempt} timed out"), "timeout".to_string());
                write_with_retry(id, "run audit write", || {
                    ctx.store
                        .record_run(id, Utc::now(), elapsed_ms(started_at), TaskStatus::Cancelled, Some("timeout".to_string()))
                })
                .await;
                if attempt < retry_policy.max_attempts {
                    tokio::time::sleep(retry_policy.backoff_for_attempt(attempt)).await;
                    attempt += 1;
                    continue;
                }
                break attempt_outcome;
            }
            HandlerOutcome::Failed(e) => {
                log_capture.log_error(|| format!("attempt {attempt} failed"), e.to_string());
                write_with_retry(id, "run audit write", || {
                    ctx.store
                        .record_run(id, Utc::now(), elapsed_ms(started_at), TaskStatus::Failed, Some(e.to_string()))
                })
                .await;
                if attempt < retry_policy.max_attempts {
                    tokio::time::sleep(retry_policy.backoff_for_attempt(attempt)).await;
                    attempt += 1;
                    continue;
                }
                break attempt_outcome;
            }
        }
    };

    let persisted_logs = log_capture.take_buffered();
    if !persisted_logs.is_empty() {
        if let Err(e) = ctx.store.append_logs(id, &persisted_logs).await {
            warn!(task_id = %id, error = %e, "failed to persist captured logs");
        }
    }

    ctx.cancellation.unregister(id);
    ctx.cancellation.clear_blacklist(id);

    let execution_time_ms = elapsed_ms(started_at);
    task.execution_time_ms = execution_time_ms;
    task.last_execution_utc = Some(Utc::now());

    match outcome {
        HandlerOutcome::Success => {
            handler.on_completed(id).await;
            write_with_retry(id, "run audit write", || {
                ctx.store.record_run(id, Utc::now(), execution_time_ms, TaskStatus::Completed, None)
            })
            .await;
            ctx.event_bus
                .publish(TaskEvent::RunCompleted {
                    task_id: id,
                    execution_time_ms,
                })
                .await;
            finish_or_reschedule(task, handler, ctx).await;
        }
        HandlerOutcome::Cancelled => {
            let error = anyhow::anyhow!("cancelled");
            handler.on_error(id, &error).await;
            write_with_retry(id, "Cancelled status write", || ctx.store.set_status(id, TaskStatus::Cancelled, None)).await;
            ctx.event_bus
                .publish(TaskEvent::StatusChanged {
                    task_id: id,
                    status: TaskStatus::Cancelled,
                    queue_name: task.queue_name.clone(),
                })
                .await;
        }
        HandlerOutcome::Timeout => {
            let message = "handler timed out".to_string();
            let error = anyhow::anyhow!(message.clone());
            handler.on_error(id, &error).await;
            write_with_retry(id, "Cancelled status write", || {
                ctx.store.set_status(id, TaskStatus::Cancelled, Some(message.clone()))
            })
            .await;
            ctx.event_bus
                .publish(TaskEvent::StatusChanged {
                    task_id: id,
                    status: TaskStatus::Cancelled,
                    queue_name: task.queue_name.clone(),
                })
                .await;
            // Recurring tasks keep ticking past a timed-out occurrence by
            // default rather than killing the whole schedule.
            if task.is_recurring {
                finish_or_reschedule(task, handler, ctx).await;
            }
        }
        HandlerOutcome::Failed(e) => {
            let message = e.to_string();
            handler.on_error(id, &e).await;
            write_with_retry(id, "Failed status write", || {
                ctx.store.set_status(id, TaskStatus::Failed, Some(message.clone()))
            })
            .await;
            ctx.event_bus
                .publish(TaskEvent::RunFailed {
                    task_id: id,
                    error: message,
                })
                .await;
            // Recurring tasks keep ticking past a failed occurrence by
            // default rather than killing the whole schedule.
            if task.is_recurring {
                finish_or_reschedule(task, handler, ctx).await;
            }
        }
    }
}

async fn invoke_with_timeout(
    handler: &dyn crate::handler::ErasedHandler,
    payload: &[u8],
    cancel_token: tokio_util::sync::CancellationToken,
    timeout: Option<Duration>,
) -> HandlerOutcome {
    match timeout {
        Some(duration) => {
            tokio::select! {
                outcome = handler.invoke(payload, cancel_token.clone()) => outcome,
                _ = cancel_token.cancelled() => HandlerOutcome::Cancelled,
                _ = tokio::time::sleep(duration) => {
                    cancel_token.cancel();
                    HandlerOutcome::Timeout
                }
            }
        }
        None => {
            tokio::select! {
                outcome = handler.invoke(payload, cancel_token.clone()) => outcome,
                _ = cancel_token.cancelled() => HandlerOutcome::Cancelled,
            }
        }
    }
}

fn elapsed_ms(started_at: chrono::DateTime<Utc>) -> f64 {
    (Utc::now() - started_at).num_microseconds().unwrap_or(0) as f64 / 1000.0
}

/// Non-recurring: terminal Completed already implied by the caller's status
/// write. Recurring: evaluate the next occurrence and either hand it back to
/// the scheduler, enqueue it immediately, or close out the schedule. `handler`
/// is the same bound handler that just ran — reused as-is for the next
/// occurrence rather than re-resolved from a registry.
async fn finish_or_reschedule(mut task: Task, handler: Arc<dyn crate::handler::ErasedHandler>, ctx: &WorkerPoolContext) {
    if !task.is_recurring {
        let id = task.id;
        write_with_retry(id, "Completed status write", || ctx.store.set_status(id, TaskStatus::Completed, None)).await;
        ctx.event_bus
            .publish(TaskEvent::StatusChanged {
                task_id: task.id,
                status: TaskStatus::Completed,
                queue_name: task.queue_name.clone(),
            })
            .await;
        return;
    }

    let Some(rule) = task.recurring_rule.clone() else {
        let id = task.id;
        write_with_retry(id, "Completed status write", || ctx.store.set_status(id, TaskStatus::Completed, None)).await;
        return;
    };

    let current_run_count = task.current_run_count.unwrap_or(0) + 1;
    let now = Utc::now();
    let scheduled_time = task.scheduled_execution_utc.unwrap_or(task.created_at_utc);
    let result = evaluate_next_run(&rule, scheduled_time, current_run_count, now);

    task.current_run_count = Some(current_run_count);

    match result.next_run {
        Some(next_run) => {
            task.next_run_utc = Some(next_run);
            let status = if next_run <= now {
                TaskStatus::WaitingQueue
            } else {
                TaskStatus::Pending
            };
            task.status = status;
            write_with_retry(task.id, "recurring reschedule write", || ctx.store.update_task(&task)).await;
            ctx.event_bus
                .publish(TaskEvent::StatusChanged {
                    task_id: task.id,
                    status,
                    queue_name: task.queue_name.clone(),
                })
                .await;

            let queue_name = task.queue_name.clone();
            if next_run <= now {
                let executor = Executor::new(task, handler);
                if let Err(e) = ctx.queue_manager.enqueue(&queue_name, executor).await {
                    warn!(error = %e, "failed to immediately re-enqueue due recurring task");
                }
            } else {
                let executor = Executor::new(task, handler);
                ctx.schedule_handle.schedule(executor, next_run, queue_name).await;
            }
        }
        None => {
            write_with_retry(task.id, "Completed status write", || ctx.store.set_status(task.id, TaskStatus::Completed, None))
                .await;
            ctx.event_bus
                .publish(TaskEvent::StatusChanged {
                    task_id: task.id,
                    status: TaskStatus::Completed,
                    queue_name: task.queue_name.clone(),
                })
                .await;
        }
    }
}
