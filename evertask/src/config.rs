//! Engine-wide configuration.
//!
//! Config-file parsing is host/CLI glue and stays out of scope here; this
//! is a plain struct the host builds in code, with `#[serde(default =
//! "...")]` defaults on every field so it still round-trips through a
//! config format if a host wants one.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_default_queue_capacity() -> usize {
    1_000
}

fn default_channel_buffer_size() -> usize {
    1_000
}

fn default_graceful_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_degree_of_parallelism() -> usize {
    4
}

/// How a [`WorkerQueue`](crate::queue::WorkerQueue) behaves when it is at
/// capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FullMode {
    /// Block the producer until space frees — intentional backpressure.
    Wait,
    /// Enqueue on `"default"` instead (falls back to `Wait` if the target
    /// queue IS `"default"`).
    FallbackToDefault,
    /// Return `EverTaskError::QueueFull` to the producer.
    ThrowException,
}

impl Default for FullMode {
    fn default() -> Self {
        FullMode::Wait
    }
}

/// Per-queue tunables; queues not listed here get the engine defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default = "default_default_queue_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub full_mode: FullMode,
    #[serde(default = "default_max_degree_of_parallelism")]
    pub max_degree_of_parallelism: usize,
    pub default_timeout: Option<Duration>,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: default_default_queue_capacity(),
            full_mode: FullMode::default(),
            max_degree_of_parallelism: default_max_degree_of_parallelism(),
            default_timeout: None,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_full_mode(mut self, full_mode: FullMode) -> Self {
        self.full_mode = full_mode;
        self
    }

    pub fn with_parallelism(mut self, n: usize) -> Self {
        self.max_degree_of_parallelism = n;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EverTaskConfig {
    /// Queues the host declares up front. `"default"` is always present even
    /// if omitted here; `"recurring"` is created lazily if not declared.
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    #[serde(default = "default_graceful_shutdown_timeout")]
    pub graceful_shutdown_timeout: Duration,
    /// Dispatch-time persistence failures propagate to the producer when
    /// set; otherwise they are logged and dispatch continues best-effort.
    #[serde(default)]
    pub throw_if_unable_to_persist: bool,
    /// Minimum log level the log-capture sink buffers for persistence.
    /// Logs below this level still reach the host's `tracing` subscriber,
    /// just aren't persisted.
    #[serde(default)]
    pub min_persist_level: evertask_core::LogLevel,
    #[serde(default = "default_max_persisted_logs")]
    pub max_persisted_logs: usize,
}

fn default_max_persisted_logs() -> usize {
    200
}

impl Default for EverTaskConfig {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            channel_buffer_size: default_channel_buffer_size(),
            graceful_shutdown_timeout: default_graceful_shutdown_timeout(),
            throw_if_unable_to_persist: false,
            min_persist_level: evertask_core::LogLevel::Info,
            max_persisted_logs: default_max_persisted_logs(),
        }
    }
}
