//! Broadcast-backed [`EventBus`] implementation.

use async_trait::async_trait;
use evertask_core::{EventBus, TaskEvent};
use tokio::sync::broadcast;
use tracing::debug;

/// Fans lifecycle events out to every subscriber. Delivery is best-effort:
/// a lagging or absent subscriber never affects dispatch, scheduling, or
/// execution.
pub struct BroadcastEventBus {
    sender: broadcast::Sender<TaskEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: TaskEvent) {
        // `send` only fails when there are no subscribers; that is a normal
        // and expected state (no monitoring surface attached), not an error.
        if self.sender.send(event).is_err() {
            debug!("no event bus subscribers; event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evertask_core::TaskId;

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error() {
        let bus = BroadcastEventBus::new(16);
        bus.publish(TaskEvent::RunCompleted {
            task_id: TaskId::new(),
            execution_time_ms: 1.0,
        })
        .await;
    }

    #[tokio::test]
    async fn subscriber_receives_event() {
        let bus = BroadcastEventBus::new(16);
        let mut rx = bus.subscribe();
        let id = TaskId::new();
        bus.publish(TaskEvent::StatusChanged {
            task_id: id,
            status: evertask_core::TaskStatus::Completed,
            queue_name: "default".to_string(),
        })
        .await;
        let event = rx.recv().await.unwrap();
        match event {
            TaskEvent::StatusChanged { task_id, .. } => assert_eq!(task_id, id),
            _ => panic!("wrong event"),
        }
    }
}
