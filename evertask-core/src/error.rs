//! Dispatch-time error vocabulary.

/// Failure modes a producer can observe from the dispatcher.
///
/// Runtime failures (handler panics, timeouts, store writes during
/// execution) never reach the producer — they are captured by the worker
/// pool, persisted as `Failed`/`Cancelled`, and surfaced through lifecycle
/// callbacks and the event bus instead.
#[derive(Debug, thiserror::Error)]
pub enum EverTaskError {
    #[error("no handler registered for request type `{0}`")]
    HandlerNotRegistered(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("task store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("queue `{0}` is full")]
    QueueFull(String),
}
