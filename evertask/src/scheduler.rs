//! Timer scheduler: a monotonic min-heap of `(dueInstant, executor)` pairs
//! with a single wake loop, collapsed onto one heap instead of one
//! `tokio::time::Interval` per task, since instants here are one-off or
//! recomputed after each recurring fire rather than fixed periods.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use evertask_core::TaskId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::executor::Executor;
use crate::queue_manager::QueueManager;

/// Commands the wake loop accepts from dispatchers and the worker pool.
enum Command {
    Schedule {
        task_id: TaskId,
        due: chrono::DateTime<Utc>,
        executor: Executor,
        queue_name: String,
    },
    Cancel(TaskId),
    Stop,
}

/// Cheap, cloneable handle for submitting work to a running [`Scheduler`].
#[derive(Clone)]
pub struct ScheduleHandle {
    sender: mpsc::Sender<Command>,
}

impl ScheduleHandle {
    pub async fn schedule(&self, executor: Executor, due: chrono::DateTime<Utc>, queue_name: impl Into<String>) {
        let task_id = executor.task.id;
        if self
            .sender
            .send(Command::Schedule {
                task_id,
                due,
                executor,
                queue_name: queue_name.into(),
            })
            .await
            .is_err()
        {
            warn!(?task_id, "scheduler stopped, dropping schedule request");
        }
    }

    pub async fn cancel(&self, task_id: TaskId) {
        let _ = self.sender.send(Command::Cancel(task_id)).await;
    }

    pub async fn stop(&self) {
        let _ = self.sender.send(Command::Stop).await;
    }
}

/// Heap entry ordered by due instant, then task id, so entries with equal
/// instants fire in a deterministic (ascending id) order.
struct TimerEntry {
    due: chrono::DateTime<Utc>,
    task_id: TaskId,
    executor: Executor,
    queue_name: String,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.task_id == other.task_id
    }
}
impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so a `BinaryHeap` (max-heap) behaves as a min-heap.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

/// Single-writer, single-reader min-heap scheduler. Runs as a background
/// task; callers interact through a [`ScheduleHandle`].
pub struct Scheduler {
    heap: BinaryHeap<TimerEntry>,
    cancelled: HashSet<TaskId>,
    command_rx: mpsc::Receiver<Command>,
    queue_manager: Arc<QueueManager>,
}

impl Scheduler {
    /// Spawns the wake loop and returns a handle plus its join handle so the
    /// host can await clean shutdown.
    pub fn spawn(queue_manager: Arc<QueueManager>, command_buffer: usize) -> (ScheduleHandle, JoinHandle<()>) {
        let (sender, command_rx) = mpsc::channel(command_buffer.max(1));
        let scheduler = Scheduler {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            command_rx,
            queue_manager,
        };
        let join = tokio::spawn(scheduler.run());
        (ScheduleHandle { sender }, join)
    }

    async fn run(mut self) {
        loop {
            let sleep_for = match self.heap.peek() {
                Some(entry) => {
                    let now = Utc::now();
                    if entry.due <= now {
                        Duration::ZERO
                    } else {
                        (entry.due - now).to_std().unwrap_or(Duration::ZERO)
                    }
                }
                // No pending entries: wait long enough that a fresh
                // `Schedule`/`Stop` command interrupts us well before it fires.
                None => Duration::from_secs(3600),
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {
                    self.drain_due().await;
                }
                maybe_command = self.command_rx.recv() => {
                    match maybe_command {
                        Some(Command::Schedule { task_id, due, executor, queue_name }) => {
                            self.cancelled.remove(&task_id);
                            self.heap.push(TimerEntry { due, task_id, executor, queue_name });
                        }
                        Some(Command::Cancel(task_id)) => {
                            self.cancelled.insert(task_id);
                        }
                        Some(Command::Stop) | None => {
                            debug!("scheduler wake loop stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Pops every entry due at or before now and hands it to the queue
    /// manager. Clock drift is tolerated by draining greedily rather than
    /// re-arming once per entry.
    async fn drain_due(&mut self) {
        let now = Utc::now();
        while let Some(entry) = self.heap.peek() {
            if entry.due > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked Some");
            if self.cancelled.remove(&entry.task_id) {
                debug!(task_id = %entry.task_id, "dropping cancelled scheduled task");
                continue;
            }
            if let Err(e) = self.queue_manager.enqueue(&entry.queue_name, entry.executor).await {
                warn!(task_id = %entry.task_id, error = %e, "failed to enqueue due task");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EverTaskConfig;
    use evertask_core::Task;

    fn make_executor(queue: &str) -> Executor {
        Executor::missing_handler(Task::new("req", "handler", vec![], queue, None))
    }

    #[tokio::test]
    async fn due_entry_reaches_queue_manager() {
        let manager = Arc::new(QueueManager::new(&EverTaskConfig::default()));
        let (handle, join) = Scheduler::spawn(Arc::clone(&manager), 16);
        let executor = make_executor("default");
        let task_id = executor.task.id;
        handle.schedule(executor, Utc::now(), "default").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;
        let _ = join.await;

        let default_queue = manager.default_queue();
        let dequeued = tokio::time::timeout(Duration::from_millis(100), default_queue.dequeue(task_id))
            .await
            .expect("queue should have received the due task");
        assert_eq!(dequeued.unwrap().task.id, task_id);
    }

    #[tokio::test]
    async fn cancelled_entry_never_reaches_queue() {
        let manager = Arc::new(QueueManager::new(&EverTaskConfig::default()));
        let (handle, join) = Scheduler::spawn(Arc::clone(&manager), 16);
        let executor = make_executor("default");
        let task_id = executor.task.id;
        let due = Utc::now() + chrono::Duration::milliseconds(200);
        handle.schedule(executor, due, "default").await;
        handle.cancel(task_id).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.stop().await;
        let _ = join.await;

        let default_queue = manager.default_queue();
        let result = tokio::time::timeout(Duration::from_millis(50), default_queue.dequeue(TaskId::new())).await;
        assert!(result.is_err(), "cancelled task must not be enqueued");
    }
}
