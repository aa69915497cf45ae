//! EverTask: an in-process, at-least-once background job execution engine.
//!
//! [`EverTaskBuilder`] registers handlers and wires a store/event bus;
//! [`EverTaskBuilder::start`] recovers any pending work and spins up the
//! scheduler and worker pools. The returned [`EverTask`] handle is the
//! producer-facing surface: [`EverTask::dispatch`] and [`EverTask::cancel`].

pub mod cancellation;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod executor;
pub mod handler;
pub mod log_capture;
pub mod memory_store;
pub mod queue;
pub mod queue_manager;
pub mod scheduler;
pub mod service;
pub mod worker_pool;

use std::sync::Arc;

use evertask_core::{EventBus, PersistentStore, TaskId};

pub use config::{EverTaskConfig, FullMode, QueueConfig};
pub use dispatcher::{DispatchOptions, Dispatcher};
pub use evertask_core::{
    schedule::{IntervalKind, RecurringRule},
    AuditLevel, EverTaskError, HandlerCapabilities, HandlerOutcome, LogLevel, RetryPolicy, TaskStatus,
};
pub use events::BroadcastEventBus;
pub use handler::{HandlerRegistry, TaskHandler};
pub use memory_store::MemoryStore;
pub use service::WorkerService;

use cancellation::CancellationRegistry;
use queue_manager::QueueManager;

/// Registers handlers and dependencies before the engine starts.
pub struct EverTaskBuilder {
    registry: HandlerRegistry,
    config: EverTaskConfig,
    store: Option<Arc<dyn PersistentStore>>,
    event_bus: Option<Arc<dyn EventBus>>,
}

impl EverTaskBuilder {
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            config: EverTaskConfig::default(),
            store: None,
            event_bus: None,
        }
    }

    pub fn with_config(mut self, config: EverTaskConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Binds a handler to request type `Req`. Exactly one handler per
    /// request type may be registered.
    pub fn register_handler<Req, H>(mut self, handler: H) -> Self
    where
        Req: serde::de::DeserializeOwned + serde::Serialize + Send + Sync + 'static,
        H: TaskHandler<Req>,
    {
        self.registry.register::<Req, H>(handler);
        self
    }

    /// Runs boot recovery and starts the scheduler and worker pools.
    pub async fn start(self) -> anyhow::Result<EverTask> {
        let registry = Arc::new(self.registry);
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let event_bus = self.event_bus.unwrap_or_else(|| Arc::new(BroadcastEventBus::default()));
        let cancellation = Arc::new(CancellationRegistry::new());
        let queue_manager = Arc::new(QueueManager::new(&self.config));

        let (service, schedule_handle) = WorkerService::start(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&event_bus),
            Arc::clone(&cancellation),
            Arc::clone(&queue_manager),
            &self.config,
        )
        .await?;

        let dispatcher = Dispatcher::new(registry, store, queue_manager, schedule_handle, cancellation, self.config);

        Ok(EverTask { dispatcher, service })
    }
}

impl Default for EverTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The running engine. Dropping this without calling [`EverTask::stop`]
/// leaves the scheduler and worker pools running in the background until
/// the process exits; call `stop` for a graceful shutdown.
pub struct EverTask {
    dispatcher: Dispatcher,
    service: WorkerService,
}

impl EverTask {
    pub fn builder() -> EverTaskBuilder {
        EverTaskBuilder::new()
    }

    pub async fn dispatch<Req>(&self, request: Req, options: DispatchOptions) -> Result<TaskId, EverTaskError>
    where
        Req: serde::Serialize + Send + Sync + 'static,
    {
        self.dispatcher.dispatch(request, options).await
    }

    pub async fn cancel(&self, id: TaskId) -> Result<(), EverTaskError> {
        self.dispatcher.cancel(id).await
    }

    pub async fn stop(self) {
        self.service.stop().await;
    }
}
