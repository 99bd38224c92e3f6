//! Retry policies for task execution.
//!
//! A policy looks at a failed attempt and decides whether to try again and
//! how long to wait first. Two strategies are provided:
//! - [`NeverRetry`]: the default; one attempt only.
//! - [`RetrySettings`]: a bounded number of attempts, a delay curve, and an
//!   error filter that by default refuses to retry workflow-level failures.
//!
//! [`run_with_retry`] applies a policy around an operation and produces the
//! final [`TaskResult`] that gets recorded in history.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use turnflow_types::workflow::{DelayConfig, RetryConfig, TaskResult};

use super::error::{TaskError, record_error};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then run the next attempt.
    Retry(Duration),
    /// Record the failure.
    GiveUp,
}

/// Strategy consulted after every failed attempt.
pub trait RetryPolicy: Send + Sync {
    /// `attempt` is 1-based: the first execution is attempt 1.
    fn decide(&self, error: &TaskError, attempt: u32) -> RetryDecision;
}

/// One attempt, never retried.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn decide(&self, _error: &TaskError, _attempt: u32) -> RetryDecision {
        RetryDecision::GiveUp
    }
}

// ---------------------------------------------------------------------------
// DelayCurve
// ---------------------------------------------------------------------------

/// Delay before the attempt following a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayCurve {
    Immediate,
    Linear(Duration),
    /// `initial * 2^(attempt - 1)`, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl DelayCurve {
    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            DelayCurve::Immediate => Duration::ZERO,
            DelayCurve::Linear(delay) => delay,
            DelayCurve::Exponential { initial, max } => {
                let exponent = attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << exponent).min(max)
            }
        }
    }
}

impl From<DelayConfig> for DelayCurve {
    fn from(config: DelayConfig) -> Self {
        match config {
            DelayConfig::Immediate => DelayCurve::Immediate,
            DelayConfig::Linear { delay_ms } => DelayCurve::Linear(Duration::from_millis(delay_ms)),
            DelayConfig::Exponential { initial_ms, max_ms } => DelayCurve::Exponential {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// RetrySettings
// ---------------------------------------------------------------------------

/// Predicate deciding whether an error may be retried at all.
pub type ErrorFilter = Arc<dyn Fn(&TaskError) -> bool + Send + Sync>;

/// Ordinary failures are retryable; workflow-level failures are not.
pub fn default_error_filter(error: &TaskError) -> bool {
    !error.is_workflow()
}

/// Fixed-settings retry: bounded attempts, a delay curve, an error filter.
#[derive(Clone)]
pub struct RetrySettings {
    max_attempts: u32,
    delay: DelayCurve,
    filter: ErrorFilter,
}

impl RetrySettings {
    /// `max_attempts` counts the first execution; values below 1 behave as 1.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: DelayCurve::Immediate,
            filter: Arc::new(default_error_filter),
        }
    }

    pub fn with_delay(mut self, delay: DelayCurve) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the error filter. Return `true` for errors that may be retried.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&TaskError) -> bool + Send + Sync + 'static,
    {
        self.filter = Arc::new(filter);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> DelayCurve {
        self.delay
    }
}

impl fmt::Debug for RetrySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySettings")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy for RetrySettings {
    fn decide(&self, error: &TaskError, attempt: u32) -> RetryDecision {
        if attempt < self.max_attempts && (self.filter)(error) {
            RetryDecision::Retry(self.delay.delay_for(attempt))
        } else {
            RetryDecision::GiveUp
        }
    }
}

impl From<&RetryConfig> for RetrySettings {
    fn from(config: &RetryConfig) -> Self {
        RetrySettings::new(config.max_attempts).with_delay(config.delay.into())
    }
}

/// Build the policy described by a config: `NeverRetry` for a single attempt.
pub fn policy_from_config(config: &RetryConfig) -> Arc<dyn RetryPolicy> {
    if config.max_attempts <= 1 {
        Arc::new(NeverRetry)
    } else {
        Arc::new(RetrySettings::from(config))
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Run `operation` under `policy` until it succeeds or the policy gives up.
pub async fn run_with_retry<F, Fut>(policy: &dyn RetryPolicy, kind: &str, mut operation: F) -> TaskResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, TaskError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return TaskResult::Succeeded(value),
            Err(error) => match policy.decide(&error, attempt) {
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        kind,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "task attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    tracing::debug!(kind, attempt, error = %error, "task failed");
                    return record_error(&error);
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
