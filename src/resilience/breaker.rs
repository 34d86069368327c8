//! Circuit Breaker Enhancer
//!
//! A fail-fast guard over a persistently failing unit. The breaker is an
//! explicit three-state machine; every transition happens inside this
//! module so the logic is auditable in one place.
//!
//! State transitions:
//!
//! ```text
//! closed --[failures reach threshold]--> open
//! open ----[reset timeout elapsed]-----> half-open
//! half-open --[success]--> closed
//! half-open --[failure]--> open (once failures reach threshold again)
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

use super::ExecutableUnit;

/// Circuit breaker policy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerPolicy {
    /// Consecutive failures that trip the breaker open
    pub failure_threshold: u32,
    /// Cooldown before an open breaker allows a probe call, in milliseconds
    pub reset_timeout_ms: u64,
}

impl BreakerPolicy {
    pub fn new(failure_threshold: u32, reset_timeout_ms: u64) -> Self {
        Self {
            failure_threshold,
            reset_timeout_ms,
        }
    }
}

/// The breaker's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; failures are counted
    Closed,
    /// Calls fail fast without invoking the unit
    Open,
    /// One probe call is allowed through after the cooldown
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Shared circuit breaker handle.
///
/// One breaker instance guards one logical operation; the executor keeps
/// its breaker across calls so the failure history persists.
pub struct CircuitBreaker {
    policy: BreakerPolicy,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given policy.
    pub fn new(policy: BreakerPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().map(|g| g.state).unwrap_or(BreakerState::Open)
    }

    /// Returns the current consecutive-failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().map(|g| g.failure_count).unwrap_or(0)
    }

    /// Gates a call attempt.
    ///
    /// While open, fails fast with `CIRCUIT_BREAKER_OPEN` unless the reset
    /// timeout has elapsed, in which case the breaker moves to half-open
    /// with a cleared counter and lets the call proceed.
    pub fn try_acquire(&self, step_id: &str) -> Result<(), WorkflowError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| WorkflowError::execution(step_id, "circuit breaker lock poisoned"))?;

        if guard.state == BreakerState::Open {
            let cooled_down = guard
                .last_failure
                .map(|at| at.elapsed() > Duration::from_millis(self.policy.reset_timeout_ms))
                .unwrap_or(true);

            if cooled_down {
                debug!("step '{}': circuit breaker half-open, probing", step_id);
                guard.state = BreakerState::HalfOpen;
                guard.failure_count = 0;
            } else {
                return Err(WorkflowError::CircuitBreakerOpen {
                    step_id: step_id.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Records a successful call: the counter resets and the breaker closes.
    pub fn record_success(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.failure_count = 0;
            guard.state = BreakerState::Closed;
        }
    }

    /// Records a failed call; reaching the threshold opens the breaker.
    pub fn record_failure(&self, step_id: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.failure_count += 1;
            guard.last_failure = Some(Instant::now());
            if guard.failure_count >= self.policy.failure_threshold {
                warn!(
                    "step '{}': circuit breaker opened after {} consecutive failures",
                    step_id, guard.failure_count
                );
                guard.state = BreakerState::Open;
            }
        }
    }
}

/// Wraps a unit with a shared circuit breaker.
///
/// The breaker gates every individual attempt: when composed inside a
/// retry enhancer, each retry is separately admitted or rejected.
pub fn with_circuit_breaker(unit: ExecutableUnit, breaker: Arc<CircuitBreaker>) -> ExecutableUnit {
    Arc::new(move |ctx| {
        breaker.try_acquire(&ctx.step_id)?;

        match unit(Arc::clone(&ctx)) {
            Ok(output) => {
                breaker.record_success();
                Ok(output)
            }
            Err(error) => {
                breaker.record_failure(&ctx.step_id);
                Err(error)
            }
        }
    })
}
