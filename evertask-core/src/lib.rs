//! Data model, storage contract, and recurring-schedule evaluator for EverTask.
//!
//! This crate contains the types and traits shared by the `evertask` runtime
//! and any `PersistentStore` backend (such as `evertask-sqlite`). It has no
//! I/O of its own: the recurring-rule evaluator is a pure function and the
//! store/event-bus contracts are traits implemented elsewhere.

pub mod error;
pub mod events;
pub mod handler;
pub mod schedule;
pub mod store;
pub mod task;

pub use error::EverTaskError;
pub use events::{EventBus, TaskEvent};
pub use handler::{HandlerCapabilities, HandlerOutcome, RetryPolicy};
pub use schedule::{evaluate_next_run, IntervalKind, NextRun, RecurringRule};
pub use store::PersistentStore;
pub use task::{AuditLevel, ExecutionLog, LogLevel, RunAudit, StatusAudit, Task, TaskId, TaskStatus};

/// Result type alias used throughout the crate's internal plumbing.
///
/// The public dispatch surface in the `evertask` crate narrows failures to
/// [`EverTaskError`]; everything below that uses this wider alias instead.
pub type Result<T> = anyhow::Result<T>;
