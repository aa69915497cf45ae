//! Worker service: boot recovery and the start/stop lifecycle that owns
//! the scheduler and worker-pool consumers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use evertask_core::{EventBus, PersistentStore, TaskEvent, TaskStatus};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cancellation::CancellationRegistry;
use crate::config::EverTaskConfig;
use crate::executor::Executor;
use crate::handler::HandlerRegistry;
use crate::queue_manager::QueueManager;
use crate::scheduler::{ScheduleHandle, Scheduler};
use crate::worker_pool::{spawn_consumers, WorkerPoolContext};

/// Owns the running engine: the scheduler's wake loop and one consumer pool
/// per queue. Built by [`crate::EverTask::start`].
pub struct WorkerService {
    scheduler_join: JoinHandle<()>,
    consumer_joins: Vec<JoinHandle<()>>,
    schedule_handle: ScheduleHandle,
    store: Arc<dyn PersistentStore>,
    event_bus: Arc<dyn EventBus>,
    cancellation: Arc<CancellationRegistry>,
    graceful_shutdown_timeout: Duration,
}

impl WorkerService {
    pub async fn start(
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn PersistentStore>,
        event_bus: Arc<dyn EventBus>,
        cancellation: Arc<CancellationRegistry>,
        queue_manager: Arc<QueueManager>,
        config: &EverTaskConfig,
    ) -> anyhow::Result<(Self, ScheduleHandle)> {
        let (schedule_handle, scheduler_join) = Scheduler::spawn(Arc::clone(&queue_manager), config.channel_buffer_size);

        recover_pending(&registry, &store, &event_bus, &queue_manager, &schedule_handle).await?;

        let ctx = WorkerPoolContext {
            store: Arc::clone(&store),
            event_bus: Arc::clone(&event_bus),
            cancellation: Arc::clone(&cancellation),
            schedule_handle: schedule_handle.clone(),
            queue_manager: Arc::clone(&queue_manager),
            min_persist_level: config.min_persist_level,
            max_persisted_logs: config.max_persisted_logs,
        };

        let mut consumer_joins = Vec::new();
        for queue_name in queue_manager.queue_names() {
            if let Some(queue) = queue_manager.get(&queue_name) {
                consumer_joins.extend(spawn_consumers(queue, ctx.clone()));
            }
        }

        info!(queues = queue_manager.queue_names().len(), "worker service started");

        let service = Self {
            scheduler_join,
            consumer_joins,
            schedule_handle: schedule_handle.clone(),
            store,
            event_bus,
            cancellation,
            graceful_shutdown_timeout: config.graceful_shutdown_timeout,
        };
        Ok((service, schedule_handle))
    }

    /// Graceful shutdown: signal cancellation, give in-flight handlers a
    /// grace period, force-close anything still running, then halt the
    /// scheduler and consumer tasks.
    pub async fn stop(self) {
        info!("worker service stopping");
        self.cancellation.cancel_all();

        tokio::time::sleep(self.graceful_shutdown_timeout).await;

        if let Err(e) = self.mark_stuck_tasks_stopped().await {
            warn!(error = %e, "failed marking in-progress tasks ServiceStopped during shutdown");
        }

        self.schedule_handle.stop().await;
        let _ = self.scheduler_join.await;
        for join in self.consumer_joins {
            join.abort();
        }
        info!("worker service stopped");
    }

    async fn mark_stuck_tasks_stopped(&self) -> anyhow::Result<()> {
        let pending = self.store.get_pending_tasks().await?;
        for task in pending.into_iter().filter(|t| t.status == TaskStatus::InProgress) {
            self.store.set_status(task.id, TaskStatus::ServiceStopped, None).await?;
            self.store
                .record_run(task.id, Utc::now(), task.execution_time_ms, TaskStatus::ServiceStopped, None)
                .await?;
            self.event_bus
                .publish(TaskEvent::StatusChanged {
                    task_id: task.id,
                    status: TaskStatus::ServiceStopped,
                    queue_name: task.queue_name,
                })
                .await;
        }
        Ok(())
    }
}

/// Step 1-3 of boot recovery: rebuild an executor for every pending row and
/// re-dispatch it without re-persisting.
async fn recover_pending(
    registry: &HandlerRegistry,
    store: &Arc<dyn PersistentStore>,
    event_bus: &Arc<dyn EventBus>,
    queue_manager: &Arc<QueueManager>,
    schedule_handle: &ScheduleHandle,
) -> anyhow::Result<()> {
    let pending = store.get_pending_tasks().await?;
    let now = Utc::now();

    for task in pending {
        let Some(handler) = registry.resolve(&task.request_type) else {
            warn!(task_id = %task.id, request_type = %task.request_type, "no handler registered for recovered task");
            store.set_status(task.id, TaskStatus::ServiceStopped, None).await?;
            event_bus
                .publish(TaskEvent::StatusChanged {
                    task_id: task.id,
                    status: TaskStatus::ServiceStopped,
                    queue_name: task.queue_name.clone(),
                })
                .await;
            continue;
        };

        let queue_name = task.queue_name.clone();
        let due = if task.is_recurring {
            task.next_run_utc.or(task.scheduled_execution_utc).unwrap_or(now)
        } else {
            task.scheduled_execution_utc.unwrap_or(now)
        };

        let executor = Executor::new(task, handler);
        if due > now || executor.task.is_recurring {
            schedule_handle.schedule(executor, due, queue_name).await;
        } else if let Err(e) = queue_manager.enqueue(&queue_name, executor).await {
            warn!(error = %e, "failed to re-enqueue recovered task");
        }
    }

    Ok(())
}
