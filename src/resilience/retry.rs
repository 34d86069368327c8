//! Retry Enhancer
//!
//! Re-invokes a failing unit up to a configured number of attempts with a
//! fixed, linear, or exponential backoff delay, optionally jittered. The
//! attempt counter on the execution context is advanced here and nowhere
//! else.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

use super::ExecutableUnit;

/// Backoff growth strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay grows linearly with the attempt number
    Linear,
    /// Delay doubles with each attempt
    Exponential,
}

/// Decides whether a given error is worth retrying.
pub type RetryPredicate = Arc<dyn Fn(&WorkflowError) -> bool + Send + Sync>;

/// Retry policy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (must be >= 1)
    pub max_attempts: u32,
    /// Base delay between attempts, in milliseconds
    pub delay_ms: u64,
    /// How the delay grows across attempts
    pub backoff: Backoff,
    /// Whether to add up to one second of random jitter to each delay
    pub jitter: bool,
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and defaults
    /// (1s fixed delay, no jitter).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay_ms: 1_000,
            backoff: Backoff::Fixed,
            jitter: false,
        }
    }

    /// Sets the base delay in milliseconds.
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Sets the backoff strategy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enables random jitter.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Computes the wait before the retry following `attempt` (1-based).
    pub fn wait_after(&self, attempt: u32) -> Duration {
        let base_ms = match self.backoff {
            Backoff::Fixed => self.delay_ms,
            Backoff::Linear => self.delay_ms.saturating_mul(attempt as u64),
            Backoff::Exponential => self
                .delay_ms
                .saturating_mul(1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX)),
        };

        let jitter_ms = if self.jitter {
            (rand::thread_rng().gen::<f64>() * 1_000.0) as u64
        } else {
            0
        };

        Duration::from_millis(base_ms.saturating_add(jitter_ms))
    }
}

/// Wraps a unit with retry-with-backoff, deciding retryability from each
/// error's own flag.
pub fn with_retry(unit: ExecutableUnit, policy: RetryPolicy) -> ExecutableUnit {
    retry_impl(unit, policy, None)
}

/// Wraps a unit with retry-with-backoff, deciding retryability through an
/// explicit predicate instead of the error's own flag.
pub fn with_retry_if(
    unit: ExecutableUnit,
    policy: RetryPolicy,
    predicate: RetryPredicate,
) -> ExecutableUnit {
    retry_impl(unit, policy, Some(predicate))
}

fn retry_impl(
    unit: ExecutableUnit,
    policy: RetryPolicy,
    predicate: Option<RetryPredicate>,
) -> ExecutableUnit {
    let max_attempts = policy.max_attempts.max(1);

    Arc::new(move |ctx| {
        let mut attempt = 1;
        loop {
            ctx.set_attempt(attempt);

            match unit(Arc::clone(&ctx)) {
                Ok(output) => {
                    if attempt > 1 {
                        debug!(
                            "step '{}' succeeded on attempt {}/{}",
                            ctx.step_id, attempt, max_attempts
                        );
                    }
                    return Ok(output);
                }
                Err(error) => {
                    let retryable = match &predicate {
                        Some(p) => p(&error),
                        None => error.is_retryable(),
                    };

                    if attempt >= max_attempts || !retryable {
                        if attempt >= max_attempts && retryable {
                            warn!(
                                "step '{}' exhausted {} attempts: {}",
                                ctx.step_id, max_attempts, error
                            );
                        }
                        return Err(error);
                    }

                    if ctx.is_cancelled() {
                        debug!("step '{}' cancelled, not retrying", ctx.step_id);
                        return Err(error);
                    }

                    let wait = policy.wait_after(attempt);
                    warn!(
                        "step '{}' attempt {}/{} failed ({}), retrying in {:?}",
                        ctx.step_id, attempt, max_attempts, error, wait
                    );
                    thread::sleep(wait);
                    attempt += 1;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::{CancellationSignal, ExecutionContext};
    use crate::resilience::unit;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn ctx() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new("flaky", "wf", Value::Null))
    }

    fn failing_unit(calls: Arc<AtomicU32>, retryable: bool) -> ExecutableUnit {
        unit(move |ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            if retryable {
                Err(WorkflowError::retryable(&ctx.step_id, "still broken"))
            } else {
                Err(WorkflowError::execution(&ctx.step_id, "fatal"))
            }
        })
    }

    #[test]
    fn test_wait_after_fixed() {
        let policy = RetryPolicy::new(5).with_delay_ms(100);
        assert_eq!(policy.wait_after(1), Duration::from_millis(100));
        assert_eq!(policy.wait_after(4), Duration::from_millis(100));
    }

    #[test]
    fn test_wait_after_linear() {
        let policy = RetryPolicy::new(5)
            .with_delay_ms(100)
            .with_backoff(Backoff::Linear);
        assert_eq!(policy.wait_after(1), Duration::from_millis(100));
        assert_eq!(policy.wait_after(3), Duration::from_millis(300));
    }

    #[test]
    fn test_wait_after_exponential() {
        let policy = RetryPolicy::new(5)
            .with_delay_ms(100)
            .with_backoff(Backoff::Exponential);
        assert_eq!(policy.wait_after(1), Duration::from_millis(100));
        assert_eq!(policy.wait_after(2), Duration::from_millis(200));
        assert_eq!(policy.wait_after(4), Duration::from_millis(800));
    }

    #[test]
    fn test_wait_after_jitter_bounds() {
        let policy = RetryPolicy::new(3).with_delay_ms(100).with_jitter();
        for _ in 0..10 {
            let wait = policy.wait_after(1);
            assert!(wait >= Duration::from_millis(100));
            assert!(wait < Duration::from_millis(1_100));
        }
    }

    #[test]
    fn test_exhausts_exact_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let wrapped = with_retry(
            failing_unit(Arc::clone(&calls), true),
            RetryPolicy::new(3).with_delay_ms(1),
        );

        let result = wrapped(ctx());
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_non_retryable_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let wrapped = with_retry(
            failing_unit(Arc::clone(&calls), false),
            RetryPolicy::new(5).with_delay_ms(1),
        );

        let result = wrapped(ctx());
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_success_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let flaky = unit(move |ctx| {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(WorkflowError::retryable(&ctx.step_id, "transient"))
            } else {
                Ok(json!("recovered"))
            }
        });

        let wrapped = with_retry(flaky, RetryPolicy::new(5).with_delay_ms(1));
        let result = wrapped(ctx()).unwrap();
        assert_eq!(result, json!("recovered"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_attempt_counter_advances() {
        let context = ctx();
        let wrapped = with_retry(
            unit(|ctx| Err(WorkflowError::retryable(&ctx.step_id, "nope"))),
            RetryPolicy::new(3).with_delay_ms(1),
        );

        let _ = wrapped(Arc::clone(&context));
        assert_eq!(context.attempt(), 3);
    }

    #[test]
    fn test_retry_if_overrides_error_flag() {
        // The error says non-retryable; the predicate says retry anyway.
        let calls = Arc::new(AtomicU32::new(0));
        let wrapped = with_retry_if(
            failing_unit(Arc::clone(&calls), false),
            RetryPolicy::new(2).with_delay_ms(1),
            Arc::new(|_| true),
        );

        let _ = wrapped(ctx());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancellation_stops_retrying() {
        let signal = CancellationSignal::new();
        let context = Arc::new(
            ExecutionContext::new("flaky", "wf", Value::Null).with_cancellation(signal.clone()),
        );

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let cancel_after_first = unit(move |ctx| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            ctx.cancellation.cancel();
            Err(WorkflowError::retryable(&ctx.step_id, "transient"))
        });

        let wrapped = with_retry(cancel_after_first, RetryPolicy::new(5).with_delay_ms(1));
        let result = wrapped(context);
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_actually_waits() {
        let wrapped = with_retry(
            unit(|ctx| Err(WorkflowError::retryable(&ctx.step_id, "slow fail"))),
            RetryPolicy::new(2).with_delay_ms(30),
        );

        let start = Instant::now();
        let _ = wrapped(ctx());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
