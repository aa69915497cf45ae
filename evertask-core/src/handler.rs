//! The handler capability set.
//!
//! A handler's configuration and lifecycle hooks are plain values rather
//! than virtual methods on a base class: a request is handled by calling
//! `handle`, and timeout/retry/queue overrides are just fields that may be
//! absent. No inheritance, no reflection — the `evertask` crate's
//! registration map binds a `requestType` string to one of these directly.

use std::time::Duration;

/// Outcome of a single handler invocation attempt: a sum type the worker
/// pool matches on, rather than exceptions as control flow.
#[derive(Debug)]
pub enum HandlerOutcome {
    Success,
    Failed(anyhow::Error),
    Cancelled,
    Timeout,
}

/// Declarative retry policy attached to a handler registration.
///
/// Retries happen in place during a single run; they do not re-enqueue the
/// task, and each attempt is recorded as its own RunAudit.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff: delay,
            backoff_multiplier: 1.0,
            max_backoff: delay,
        }
    }

    pub fn exponential(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            backoff_multiplier: 2.0,
            max_backoff,
        }
    }

    /// Delay to wait before the `attempt`-th retry (1-indexed: the delay
    /// before the second attempt is `backoff_for_attempt(1)`).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let scale = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * scale).min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Configuration and lifecycle hooks a handler registration may declare,
/// independent of the handling logic itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerCapabilities {
    pub timeout: Option<Duration>,
    pub retry_policy: Option<RetryPolicy>,
    /// `None` means "let the dispatcher pick the effective queue": the
    /// declared queue if any, else `"recurring"`/`"default"`.
    pub queue_name: Option<&'static str>,
}
