//! The dispatcher: the engine's single public entry point for submitting
//! work — immediate, delayed, at an absolute instant, or recurring — plus
//! `Cancel`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use evertask_core::{
    schedule::{evaluate_next_run, RecurringRule},
    AuditLevel, EverTaskError, PersistentStore, Task, TaskId, TaskStatus,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::cancellation::CancellationRegistry;
use crate::config::EverTaskConfig;
use crate::executor::Executor;
use crate::handler::HandlerRegistry;
use crate::queue_manager::QueueManager;
use crate::scheduler::ScheduleHandle;

/// First-run timing plus the optional recurring rule for one dispatch call.
/// The four dispatch forms are expressed as combinations of these fields
/// rather than four separate methods, mirroring how `RecurringRule` itself
/// composes first-run modifiers.
#[derive(Default)]
pub struct DispatchOptions {
    pub task_key: Option<String>,
    pub delay: Option<Duration>,
    pub at: Option<DateTime<Utc>>,
    pub recurring: Option<RecurringRule>,
    pub audit_level: Option<AuditLevel>,
}

impl DispatchOptions {
    pub fn immediate() -> Self {
        Self::default()
    }

    pub fn with_task_key(mut self, key: impl Into<String>) -> Self {
        self.task_key = Some(key.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    pub fn with_recurring(mut self, rule: RecurringRule) -> Self {
        self.recurring = Some(rule);
        self
    }

    pub fn with_audit_level(mut self, level: AuditLevel) -> Self {
        self.audit_level = Some(level);
        self
    }
}

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn PersistentStore>,
    queue_manager: Arc<QueueManager>,
    schedule_handle: ScheduleHandle,
    cancellation: Arc<CancellationRegistry>,
    config: EverTaskConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn PersistentStore>,
        queue_manager: Arc<QueueManager>,
        schedule_handle: ScheduleHandle,
        cancellation: Arc<CancellationRegistry>,
        config: EverTaskConfig,
    ) -> Self {
        Self {
            registry,
            store,
            queue_manager,
            schedule_handle,
            cancellation,
            config,
        }
    }

    /// Dispatches one request under `options`. Returns the assigned task id,
    /// or the existing one for an idempotent `taskKey` hit against a
    /// non-terminal row (an `InProgress` row is left untouched; any other
    /// non-terminal row is updated in place with this dispatch's fields).
    pub async fn dispatch<Req>(&self, request: Req, options: DispatchOptions) -> Result<TaskId, EverTaskError>
    where
        Req: Serialize + Send + Sync + 'static,
    {
        let request_type = HandlerRegistry::request_type_name::<Req>();

        // Step 1/2: idempotent re-registration via taskKey. A terminal row
        // under the key is replaced outright; an `InProgress` row is left
        // alone and its id handed back unchanged; any other non-terminal row
        // (WaitingQueue/Queued/Pending) adopts this dispatch's fields, so the
        // eventual persist below becomes an update instead of an insert.
        let mut adopt_id = None;
        if let Some(key) = &options.task_key {
            let existing = self
                .store
                .get_by_task_key(key)
                .await
                .map_err(EverTaskError::StoreUnavailable)?;
            if let Some(existing) = existing {
                if existing.status == TaskStatus::InProgress {
                    return Ok(existing.id);
                } else if existing.status.is_terminal() {
                    self.store.remove(existing.id).await.map_err(EverTaskError::StoreUnavailable)?;
                } else {
                    adopt_id = Some(existing.id);
                }
            }
        }

        // Step 3: resolve handler.
        let handler = self
            .registry
            .resolve(request_type)
            .ok_or_else(|| EverTaskError::HandlerNotRegistered(request_type.to_string()))?;

        let capabilities = handler.capabilities();
        let is_recurring = options.recurring.is_some();

        // Step 4: effective queue.
        let queue_name = match capabilities.queue_name {
            Some(name) => name.to_string(),
            None if is_recurring => {
                // Ensures the lazily-created "recurring" queue exists before
                // the task row references it.
                self.queue_manager.recurring_queue().name.clone()
            }
            None => crate::queue_manager::DEFAULT_QUEUE.to_string(),
        };

        let now = Utc::now();
        let scheduled_execution_utc = if let Some(at) = options.at {
            at
        } else if let Some(delay) = options.delay {
            now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero())
        } else {
            now
        };

        let payload =
            serde_json::to_vec(&request).map_err(|e| EverTaskError::InvalidSchedule(format!("payload serialization failed: {e}")))?;

        let mut task = Task::new(
            request_type,
            handler.handler_type_name(),
            payload,
            queue_name.clone(),
            options.task_key.clone(),
        );
        task.scheduled_execution_utc = Some(scheduled_execution_utc);
        task.audit_level = options.audit_level;

        let due_instant = if let Some(rule) = options.recurring.clone() {
            let first_run = evaluate_next_run(&rule, scheduled_execution_utc, 0, now);
            let first_run = match first_run.next_run {
                Some(instant) => instant,
                None => {
                    return Err(EverTaskError::InvalidSchedule(
                        "recurring rule produced no first occurrence".to_string(),
                    ))
                }
            };
            task.is_recurring = true;
            task.max_runs = rule.max_runs;
            task.run_until = rule.run_until;
            task.current_run_count = Some(0);
            task.recurring_rule = Some(rule);
            task.next_run_utc = Some(first_run);
            first_run
        } else {
            scheduled_execution_utc
        };

        task.status = if due_instant <= now {
            TaskStatus::WaitingQueue
        } else {
            TaskStatus::Pending
        };

        // Step 6: persist or propagate per configuration. A row adopted from
        // an existing non-terminal taskKey match keeps its original id and
        // goes through `update_task` instead of `persist`.
        if let Some(id) = adopt_id {
            task.id = id;
        }
        let write_result = if adopt_id.is_some() {
            self.store.update_task(&task).await
        } else {
            self.store.persist(&task).await
        };
        if let Err(e) = write_result {
            if self.config.throw_if_unable_to_persist {
                return Err(EverTaskError::StoreUnavailable(e));
            }
            warn!(task_id = %task.id, error = %e, "failed to persist dispatched task, continuing best-effort");
        }

        let task_id = task.id;
        let executor = Executor::new(task, handler);

        // Step 7: hand to scheduler if delayed/recurring, else enqueue directly.
        if due_instant > now || is_recurring {
            self.schedule_handle.schedule(executor, due_instant, queue_name).await;
        } else if let Err(e) = self.queue_manager.enqueue(&queue_name, executor).await {
            error!(task_id = %task_id, error = %e, "failed to enqueue dispatched task");
            return Err(e);
        }

        Ok(task_id)
    }

    /// Marks `id` Cancelled, signals any in-flight cancellation handle, and
    /// blacklists the id against a worker pool that dequeues it before the
    /// store write lands.
    pub async fn cancel(&self, id: TaskId) -> Result<(), EverTaskError> {
        self.store
            .set_cancelled_by_user(id)
            .await
            .map_err(EverTaskError::StoreUnavailable)?;
        self.cancellation.blacklist(id);
        self.cancellation.signal(id);
        self.schedule_handle.cancel(id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use async_trait::async_trait;
    use serde::Deserialize;
    use tokio_util::sync::CancellationToken;

    #[derive(Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    struct PingHandler;

    #[async_trait]
    impl crate::handler::TaskHandler<Ping> for PingHandler {
        async fn handle(&self, _request: Ping, _cancel: CancellationToken) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn make_dispatcher() -> Dispatcher {
        let mut registry = HandlerRegistry::new();
        registry.register::<Ping, _>(PingHandler);
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        let queue_manager = Arc::new(QueueManager::new(&EverTaskConfig::default()));
        let (schedule_handle, _join) = crate::scheduler::Scheduler::spawn(Arc::clone(&queue_manager), 16);
        Dispatcher::new(
            Arc::new(registry),
            store,
            queue_manager,
            schedule_handle,
            Arc::new(CancellationRegistry::new()),
            EverTaskConfig::default(),
        )
    }

    #[tokio::test]
    async fn unregistered_handler_is_rejected() {
        let dispatcher = make_dispatcher();
        #[derive(Serialize, Deserialize)]
        struct Unregistered;
        let err = dispatcher.dispatch(Unregistered, DispatchOptions::immediate()).await.unwrap_err();
        assert!(matches!(err, EverTaskError::HandlerNotRegistered(_)));
    }

    #[tokio::test]
    async fn immediate_dispatch_lands_on_default_queue() {
        let dispatcher = make_dispatcher();
        let id = dispatcher.dispatch(Ping { n: 1 }, DispatchOptions::immediate()).await.unwrap();
        let queue = dispatcher.queue_manager.default_queue();
        let dequeued = tokio::time::timeout(Duration::from_millis(100), queue.dequeue(TaskId::new()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dequeued.task.id, id);
    }

    #[tokio::test]
    async fn duplicate_task_key_returns_existing_id() {
        let dispatcher = make_dispatcher();
        let options = DispatchOptions::immediate().with_task_key("dedup");
        let first = dispatcher.dispatch(Ping { n: 1 }, options).await.unwrap();
        let second = dispatcher
            .dispatch(Ping { n: 2 }, DispatchOptions::immediate().with_task_key("dedup"))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn recurring_dispatch_produces_a_first_run_and_is_recurring() {
        let dispatcher = make_dispatcher();
        let rule = RecurringRule::new(evertask_core::IntervalKind::SecondInterval(30));
        let id = dispatcher
            .dispatch(Ping { n: 1 }, DispatchOptions::immediate().with_recurring(rule))
            .await
            .unwrap();
        let detail = dispatcher.store.get_detail(id).await.unwrap().unwrap();
        assert!(detail.task.is_recurring);
        assert!(detail.task.next_run_utc.is_some());
    }
}
