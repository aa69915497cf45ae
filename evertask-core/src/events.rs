//! Fan-out of lifecycle events to observers.
//!
//! Delivery is best-effort and non-blocking: the engine must not depend on
//! subscriber success, so publishing never returns an error the caller is
//! expected to act on.

use async_trait::async_trait;

use crate::task::{TaskId, TaskStatus};

/// A lifecycle notification emitted by the worker pool or scheduler.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    StatusChanged {
        task_id: TaskId,
        status: TaskStatus,
        queue_name: String,
    },
    RunCompleted {
        task_id: TaskId,
        execution_time_ms: f64,
    },
    RunFailed {
        task_id: TaskId,
        error: String,
    },
}

/// Fan-out notifier. Implementations are expected to be cheap to clone
/// (e.g. wrapping a `tokio::sync::broadcast::Sender`) since every
/// dispatcher/scheduler/worker holds a handle.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish never fails from the caller's point of view; a subscriber-side
    /// error (lagged receiver, closed channel) is swallowed and logged.
    async fn publish(&self, event: TaskEvent);
}
