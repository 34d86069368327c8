//! Resilience Enhancers Module
//!
//! Independent, composable wrappers over an executable unit: retry with
//! backoff, circuit breaking, timeout racing, and monitoring. Each enhancer
//! takes a unit and returns a unit of the same shape, so they compose by
//! plain function chaining.
//!
//! # Components
//!
//! - [`retry`]: retry-with-backoff
//! - [`breaker`]: circuit breaker state machine
//! - [`timeout`]: wall-clock race against a timer
//! - [`monitor`]: before/after performance capture
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use stepwise::execution::ExecutionContext;
//! use stepwise::resilience::{compose, unit, Enhancer};
//! use stepwise::resilience::retry::{with_retry, RetryPolicy};
//! use stepwise::resilience::timeout::with_timeout;
//!
//! let base = unit(|ctx| Ok(ctx.input.clone()));
//! let policy = RetryPolicy::new(3);
//! let enhanced = compose(
//!     base,
//!     vec![
//!         Box::new(move |u| with_retry(u, policy.clone())) as Enhancer,
//!         Box::new(|u| with_timeout(u, Duration::from_secs(5))) as Enhancer,
//!     ],
//! );
//!
//! let ctx = Arc::new(ExecutionContext::new("echo", "wf-1", json!(42)));
//! assert_eq!(enhanced(ctx).unwrap(), json!(42));
//! ```

pub mod breaker;
pub mod monitor;
pub mod retry;
pub mod timeout;

use std::sync::Arc;

use crate::execution::context::ExecutionContext;
use crate::step::definition::StepOutput;

pub use breaker::{with_circuit_breaker, BreakerPolicy, BreakerState, CircuitBreaker};
pub use monitor::{with_monitoring, MonitorCallback};
pub use retry::{with_retry, with_retry_if, Backoff, RetryPolicy, RetryPredicate};
pub use timeout::with_timeout;

/// An executable unit of work: shared so enhancers can re-invoke it
/// across attempts and race it on worker threads.
pub type ExecutableUnit = Arc<dyn Fn(Arc<ExecutionContext>) -> StepOutput + Send + Sync>;

/// A single enhancer application, wrapping one unit into another.
pub type Enhancer = Box<dyn FnOnce(ExecutableUnit) -> ExecutableUnit>;

/// Lifts a plain closure into an [`ExecutableUnit`].
pub fn unit<F>(f: F) -> ExecutableUnit
where
    F: Fn(Arc<ExecutionContext>) -> StepOutput + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Applies enhancers to a base unit left to right, each wrapping the
/// result of the previous application.
pub fn compose(base: ExecutableUnit, enhancers: Vec<Enhancer>) -> ExecutableUnit {
    let mut current = base;
    for enhancer in enhancers {
        current = enhancer(current);
    }
    current
}
