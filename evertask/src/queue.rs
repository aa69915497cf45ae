//! Bounded in-memory FIFO of ready executors.

use std::sync::Arc;

use evertask_core::TaskId;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::config::{FullMode, QueueConfig};
use crate::executor::Executor;

/// A single named, bounded queue. Producers enqueue ready executors;
/// `max_degree_of_parallelism` cooperating consumers (the worker pool, §4.4
/// component F) race on the shared receiver.
pub struct WorkerQueue {
    pub name: String,
    pub full_mode: FullMode,
    pub max_degree_of_parallelism: usize,
    pub default_timeout: Option<std::time::Duration>,
    sender: mpsc::Sender<Executor>,
    receiver: Arc<Mutex<mpsc::Receiver<Executor>>>,
}

impl WorkerQueue {
    pub fn new(config: &QueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        Self {
            name: config.name.clone(),
            full_mode: config.full_mode,
            max_degree_of_parallelism: config.max_degree_of_parallelism.max(1),
            default_timeout: config.default_timeout,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Blocking enqueue: the caller waits for space. This is the `Wait`
    /// policy's primitive; `QueueManager` builds the other policies on top
    /// of it.
    pub async fn enqueue_wait(&self, executor: Executor) -> anyhow::Result<()> {
        self.sender
            .send(executor)
            .await
            .map_err(|_| anyhow::anyhow!("queue `{}` closed", self.name))
    }

    /// Non-blocking enqueue; `Err` means the queue is currently full.
    pub fn try_enqueue(&self, executor: Executor) -> Result<(), Executor> {
        match self.sender.try_send(executor) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(executor)) => Err(executor),
            Err(mpsc::error::TrySendError::Closed(executor)) => {
                debug!(queue = %self.name, "enqueue on closed queue");
                Err(executor)
            }
        }
    }

    /// Consumer-side handle: blocks until an executor is ready or the queue
    /// is closed.
    pub async fn dequeue(&self, id: TaskId) -> Option<Executor> {
        let mut receiver = self.receiver.lock().await;
        let item = receiver.recv().await;
        if item.is_none() {
            debug!(queue = %self.name, ?id, "queue closed, consumer exiting");
        }
        item
    }

    pub fn cloned_sender(&self) -> mpsc::Sender<Executor> {
        self.sender.clone()
    }

    pub fn shared_receiver(&self) -> Arc<Mutex<mpsc::Receiver<Executor>>> {
        Arc::clone(&self.receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerRegistry;
    use evertask_core::Task;

    fn make_executor() -> Executor {
        let task = Task::new("req", "handler", vec![], "default", None);
        let registry = HandlerRegistry::new();
        Executor {
            handler: registry.resolve("missing"), // None is fine for a queue-plumbing test
            task,
        }
    }

    #[tokio::test]
    async fn try_enqueue_fails_when_full() {
        let config = QueueConfig::new("default").with_capacity(1);
        let queue = WorkerQueue::new(&config);
        assert!(queue.try_enqueue(make_executor()).is_ok());
        assert!(queue.try_enqueue(make_executor()).is_err());
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let config = QueueConfig::new("default").with_capacity(4);
        let queue = WorkerQueue::new(&config);
        let first = make_executor();
        let first_id = first.task.id;
        queue.enqueue_wait(first).await.unwrap();
        queue.enqueue_wait(make_executor()).await.unwrap();
        let dequeued = queue.dequeue(TaskId::new()).await.unwrap();
        assert_eq!(dequeued.task.id, first_id);
    }
}
