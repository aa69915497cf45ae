//! The in-memory executor value: bundles a task, its handler callbacks, and
//! scheduling state, and is never persisted.

use std::sync::Arc;

use evertask_core::Task;

use crate::handler::ErasedHandler;

/// Bundles a task snapshot with the resolved handler that will run it.
/// `handler` is `None` only for a boot-recovery row whose handler type
/// could not be resolved — such an executor is never run; it is written
/// straight to `ServiceStopped`.
pub struct Executor {
    pub task: Task,
    pub(crate) handler: Option<Arc<dyn ErasedHandler>>,
}

impl Executor {
    pub fn new(task: Task, handler: Arc<dyn ErasedHandler>) -> Self {
        Self {
            task,
            handler: Some(handler),
        }
    }

    pub fn missing_handler(task: Task) -> Self {
        Self { task, handler: None }
    }
}
