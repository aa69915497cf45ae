//! Registry of named queues: routing, fallback, lifecycle.

use std::sync::Arc;

use evertask_core::EverTaskError;
use tracing::{debug, warn};

use crate::config::{EverTaskConfig, FullMode, QueueConfig};
use crate::executor::Executor;
use crate::queue::WorkerQueue;

pub const DEFAULT_QUEUE: &str = "default";
pub const RECURRING_QUEUE: &str = "recurring";

/// Always contains `"default"`. Lazily creates `"recurring"` the first time
/// a recurring task routes through it, if the host did not declare it.
pub struct QueueManager {
    queues: dashmap::DashMap<String, Arc<WorkerQueue>>,
    default_config: EverTaskConfig,
}

/// Which queue actually accepted an executor — differs from the requested
/// name under `FallbackToDefault`.
pub struct EnqueueOutcome {
    pub queue_name: String,
}

impl QueueManager {
    pub fn new(config: &EverTaskConfig) -> Self {
        let queues = dashmap::DashMap::new();
        let mut has_default = false;
        for queue_config in &config.queues {
            if queue_config.name == DEFAULT_QUEUE {
                has_default = true;
            }
            queues.insert(queue_config.name.clone(), Arc::new(WorkerQueue::new(queue_config)));
        }
        if !has_default {
            queues.insert(
                DEFAULT_QUEUE.to_string(),
                Arc::new(WorkerQueue::new(&QueueConfig::new(DEFAULT_QUEUE))),
            );
        }
        Self {
            queues,
            default_config: config.clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<WorkerQueue>> {
        self.queues.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn default_queue(&self) -> Arc<WorkerQueue> {
        self.get(DEFAULT_QUEUE).expect("default queue always present")
    }

    /// Lazily creates `"recurring"` with the engine's channel-buffer default
    /// if the host never declared it explicitly.
    pub fn recurring_queue(&self) -> Arc<WorkerQueue> {
        if let Some(queue) = self.get(RECURRING_QUEUE) {
            return queue;
        }
        let config = QueueConfig::new(RECURRING_QUEUE).with_capacity(self.default_config.channel_buffer_size);
        let queue = Arc::new(WorkerQueue::new(&config));
        self.queues.insert(RECURRING_QUEUE.to_string(), Arc::clone(&queue));
        queue
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }

    /// `TryEnqueue(name, executor)`: resolves the name (falling back to
    /// `"default"` if unknown), applies the queue's fullness policy, and
    /// reports which queue actually accepted the executor.
    pub async fn enqueue(
        &self,
        queue_name: &str,
        executor: Executor,
    ) -> Result<EnqueueOutcome, EverTaskError> {
        let queue = match self.get(queue_name) {
            Some(queue) => queue,
            None => {
                warn!(requested = queue_name, "unknown queue, falling back to default");
                self.default_queue()
            }
        };

        match queue.full_mode {
            FullMode::Wait => {
                queue
                    .enqueue_wait(executor)
                    .await
                    .map_err(|e| EverTaskError::StoreUnavailable(e))?;
                Ok(EnqueueOutcome {
                    queue_name: queue.name.clone(),
                })
            }
            FullMode::ThrowException => match queue.try_enqueue(executor) {
                Ok(()) => Ok(EnqueueOutcome {
                    queue_name: queue.name.clone(),
                }),
                Err(_executor) => Err(EverTaskError::QueueFull(queue.name.clone())),
            },
            FullMode::FallbackToDefault => {
                if queue.name == DEFAULT_QUEUE {
                    // No fallback target other than itself: degrade to Wait.
                    queue
                        .enqueue_wait(executor)
                        .await
                        .map_err(|e| EverTaskError::StoreUnavailable(e))?;
                    return Ok(EnqueueOutcome {
                        queue_name: queue.name.clone(),
                    });
                }
                match queue.try_enqueue(executor) {
                    Ok(()) => Ok(EnqueueOutcome {
                        queue_name: queue.name.clone(),
                    }),
                    Err(executor) => {
                        debug!(queue = %queue.name, "full, falling back to default");
                        let default_queue = self.default_queue();
                        default_queue
                            .enqueue_wait(executor)
                            .await
                            .map_err(|e| EverTaskError::StoreUnavailable(e))?;
                        Ok(EnqueueOutcome {
                            queue_name: default_queue.name.clone(),
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use evertask_core::Task;

    fn make_executor() -> Executor {
        Executor::missing_handler(Task::new("req", "handler", vec![], "default", None))
    }

    #[test]
    fn default_and_recurring_queues_always_resolve() {
        let manager = QueueManager::new(&EverTaskConfig::default());
        assert!(manager.get(DEFAULT_QUEUE).is_some());
        assert!(manager.get(RECURRING_QUEUE).is_none());
        let recurring = manager.recurring_queue();
        assert_eq!(recurring.name, RECURRING_QUEUE);
        assert!(manager.get(RECURRING_QUEUE).is_some());
    }

    #[tokio::test]
    async fn unknown_queue_name_falls_back_to_default() {
        let manager = QueueManager::new(&EverTaskConfig::default());
        let outcome = manager.enqueue("nonexistent", make_executor()).await.unwrap();
        assert_eq!(outcome.queue_name, DEFAULT_QUEUE);
    }

    #[tokio::test]
    async fn throw_exception_reports_queue_full() {
        let mut config = EverTaskConfig::default();
        config.queues.push(
            QueueConfig::new("tiny")
                .with_capacity(1)
                .with_full_mode(FullMode::ThrowException),
        );
        let manager = QueueManager::new(&config);
        manager.enqueue("tiny", make_executor()).await.unwrap();
        let err = manager.enqueue("tiny", make_executor()).await.unwrap_err();
        assert!(matches!(err, EverTaskError::QueueFull(_)));
    }

    #[tokio::test]
    async fn fallback_to_default_when_target_full() {
        let mut config = EverTaskConfig::default();
        config.queues.push(
            QueueConfig::new("bursty")
                .with_capacity(1)
                .with_full_mode(FullMode::FallbackToDefault),
        );
        let manager = QueueManager::new(&config);
        manager.enqueue("bursty", make_executor()).await.unwrap();
        let outcome = manager.enqueue("bursty", make_executor()).await.unwrap();
        assert_eq!(outcome.queue_name, DEFAULT_QUEUE);
    }
}
