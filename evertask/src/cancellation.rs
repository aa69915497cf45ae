//! Process-wide cancellation registry.
//!
//! A sharded concurrent map from task id to a [`CancellationToken`], plus a
//! blacklist of ids that must never start execution. `dashmap` gives
//! fine-grained per-shard locking without hand-rolling a sharded map.

use dashmap::{DashMap, DashSet};
use evertask_core::TaskId;
use tokio_util::sync::CancellationToken;

/// Borrowed for the lifetime of a single execution window: inserted when a
/// worker starts a task, removed when it finishes.
#[derive(Default)]
pub struct CancellationRegistry {
    handles: DashMap<TaskId, CancellationToken>,
    blacklist: DashSet<TaskId>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh handle for a task about to start executing.
    pub fn register(&self, id: TaskId) -> CancellationToken {
        let token = CancellationToken::new();
        self.handles.insert(id, token.clone());
        token
    }

    /// Removes the handle once execution (including all retries) is done.
    pub fn unregister(&self, id: TaskId) {
        self.handles.remove(&id);
    }

    /// Signals the handle for an in-progress task, if any. Returns whether a
    /// handle was found (i.e. the task was actually running).
    pub fn signal(&self, id: TaskId) -> bool {
        if let Some(token) = self.handles.get(&id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Adds a task to the blacklist so a subsequent dequeue aborts before
    /// starting, even if the worker races ahead of the cancel signal.
    pub fn blacklist(&self, id: TaskId) {
        self.blacklist.insert(id);
    }

    pub fn is_blacklisted(&self, id: TaskId) -> bool {
        self.blacklist.contains(&id)
    }

    /// Drops the blacklist entry once the task has reached a terminal state
    /// and can never be dequeued again.
    pub fn clear_blacklist(&self, id: TaskId) {
        self.blacklist.remove(&id);
    }

    /// Signals every currently-registered handle. Used at engine shutdown.
    pub fn cancel_all(&self) {
        for entry in self.handles.iter() {
            entry.value().cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_without_registration_is_noop() {
        let registry = CancellationRegistry::new();
        assert!(!registry.signal(TaskId::new()));
    }

    #[test]
    fn register_then_signal_cancels_token() {
        let registry = CancellationRegistry::new();
        let id = TaskId::new();
        let token = registry.register(id);
        assert!(!token.is_cancelled());
        assert!(registry.signal(id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_all_signals_every_handle() {
        let registry = CancellationRegistry::new();
        let a = registry.register(TaskId::new());
        let b = registry.register(TaskId::new());
        registry.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn blacklist_round_trip() {
        let registry = CancellationRegistry::new();
        let id = TaskId::new();
        assert!(!registry.is_blacklisted(id));
        registry.blacklist(id);
        assert!(registry.is_blacklisted(id));
        registry.clear_blacklist(id);
        assert!(!registry.is_blacklisted(id));
    }
}
