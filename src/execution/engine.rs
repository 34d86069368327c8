//! Step Execution Engine
//!
//! The per-step state machine that turns a definition into a governed
//! execution: condition check, input validation, patterned execution
//! through the configured resilience enhancers, output validation,
//! cleanup, and result construction.
//!
//! The enhancers nest in a fixed order: `timeout(retry(breaker(core)))`.
//! The breaker gates every individual attempt, retry governs how many
//! attempts are made, and the timeout bounds the entire retry sequence
//! rather than a single attempt.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;

use crate::error::WorkflowError;
use crate::monitoring::{PerformanceTracker, ProgressState};
use crate::resilience::breaker::{with_circuit_breaker, CircuitBreaker};
use crate::resilience::retry::{with_retry, with_retry_if};
use crate::resilience::timeout::with_timeout;
use crate::resilience::ExecutableUnit;
use crate::step::definition::{RateLimit, StepDefinition};
use crate::step::validation::{validate_definition, validate_input, validate_output};

use super::context::{CancellationSignal, ExecutionContext, ProgressCallback};
use super::result::{CancelReason, ExecutionResult, ResultBuilder, SkipReason};

/// Internal stage outcome before result construction.
///
/// Failure snapshots the retry count at the moment the error is observed;
/// an abandoned timeout worker may keep advancing the shared attempt
/// counter afterwards.
enum Stage {
    Success {
        output: Value,
    },
    Failure {
        error: WorkflowError,
        should_retry: bool,
        retry_count: u32,
    },
    Skipped,
    Cancelled,
}

/// Executes one step definition with its full policy configuration.
///
/// An executor is bound to a single definition. Circuit breaker state and
/// the rate-limit window persist across calls on the same instance; beyond
/// those and the diagnostic counters it holds no cross-call mutable state.
///
/// # Example
///
/// ```
/// use stepwise::execution::{CancellationSignal, StepExecutor};
/// use stepwise::step::{StepDefinition, StepMetadata};
/// use serde_json::json;
/// use std::collections::HashMap;
///
/// let def = StepDefinition::new("double", StepMetadata::new("double", "1.0.0"), |ctx| {
///     Ok(json!(ctx.input.as_i64().unwrap_or(0) * 2))
/// });
///
/// let executor = StepExecutor::new(def).unwrap();
/// let result = executor.execute(
///     json!(21),
///     "wf-1",
///     HashMap::new(),
///     HashMap::new(),
///     CancellationSignal::new(),
/// );
/// assert_eq!(result.output(), Some(&json!(42)));
/// ```
pub struct StepExecutor {
    definition: Arc<StepDefinition>,
    breaker: Option<Arc<CircuitBreaker>>,
    rate_window: Arc<Mutex<VecDeque<Instant>>>,
    active_calls: Arc<AtomicU32>,
    execution_count: AtomicU64,
    last_execution: Mutex<Option<DateTime<Utc>>>,
    progress_callback: Option<ProgressCallback>,
}

impl StepExecutor {
    /// Creates an executor for a definition.
    ///
    /// Rejects structurally invalid definitions with
    /// `INVALID_STEP_DEFINITION`; this is the only way an execution path
    /// raises rather than returning a failure result.
    pub fn new(definition: StepDefinition) -> Result<Self, WorkflowError> {
        Self::from_arc(Arc::new(definition))
    }

    /// Creates an executor sharing an already-built definition.
    pub fn from_arc(definition: Arc<StepDefinition>) -> Result<Self, WorkflowError> {
        validate_definition(&definition)?;

        let breaker = definition
            .execution
            .as_ref()
            .and_then(|config| config.circuit_breaker.clone())
            .map(|policy| Arc::new(CircuitBreaker::new(policy)));

        Ok(Self {
            definition,
            breaker,
            rate_window: Arc::new(Mutex::new(VecDeque::new())),
            active_calls: Arc::new(AtomicU32::new(0)),
            execution_count: AtomicU64::new(0),
            last_execution: Mutex::new(None),
            progress_callback: None,
        })
    }

    /// Attaches a progress callback to every context this executor builds.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Returns the bound definition.
    pub fn definition(&self) -> &StepDefinition {
        &self.definition
    }

    /// Returns how many times `execute` has been called on this instance.
    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::Relaxed)
    }

    /// Returns when `execute` was last called on this instance.
    pub fn last_execution(&self) -> Option<DateTime<Utc>> {
        self.last_execution.lock().ok().and_then(|guard| *guard)
    }

    /// Executes the step once and returns its result.
    ///
    /// Caller-supplied metadata is merged over the definition-derived
    /// snapshot, so a workflow runner can thread correlation keys through
    /// to the result. Ordinary step failures are captured into the
    /// `failure` variant; this method never panics or raises for them.
    pub fn execute(
        &self,
        input: Value,
        workflow_execution_id: &str,
        prior_outputs: HashMap<String, Value>,
        metadata: HashMap<String, Value>,
        cancellation: CancellationSignal,
    ) -> ExecutionResult {
        self.execution_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_execution.lock() {
            *guard = Some(Utc::now());
        }

        let mut merged = metadata_snapshot(&self.definition);
        merged.extend(metadata);

        let mut ctx = ExecutionContext::new(&self.definition.id, workflow_execution_id, input)
            .with_prior_outputs(prior_outputs)
            .with_metadata(merged)
            .with_cancellation(cancellation);
        if let Some(callback) = &self.progress_callback {
            ctx.progress_callback = Some(Arc::clone(callback));
        }
        let ctx = Arc::new(ctx);

        let mut tracker = PerformanceTracker::new();
        if let Ok(mut perf) = ctx.performance.lock() {
            tracker.begin(&mut perf);
            perf.set_progress_state(ProgressState::InProgress);
        }

        debug!(
            "executing step '{}' (execution {})",
            self.definition.id, ctx.execution_id
        );

        let stage = self.run_stages(&ctx, &mut tracker);

        // The cleanup hook always runs; its failure never overrides the
        // primary outcome.
        if let Some(cleanup) = &self.definition.cleanup {
            if let Err(error) = cleanup(&ctx) {
                warn!(
                    "step '{}': cleanup hook failed (ignored): {}",
                    self.definition.id, error
                );
            }
        }

        let final_state = match &stage {
            Stage::Success { .. } | Stage::Skipped => ProgressState::Completed,
            Stage::Failure { .. } => ProgressState::Failed,
            Stage::Cancelled => ProgressState::Cancelled,
        };
        if let Ok(mut perf) = ctx.performance.lock() {
            tracker.finish(&mut perf);
            perf.set_progress_state(final_state);
        }

        let builder = ResultBuilder::from_context(&ctx);

        match stage {
            Stage::Success { output } => {
                info!("step '{}' completed successfully", self.definition.id);
                builder.success(output)
            }
            Stage::Failure {
                error,
                should_retry,
                retry_count,
            } => {
                warn!("step '{}' failed: {}", self.definition.id, error);
                builder.failure(error, should_retry, retry_count)
            }
            Stage::Skipped => {
                info!("step '{}' skipped: condition not met", self.definition.id);
                builder.skipped(SkipReason::ConditionNotMet, None)
            }
            Stage::Cancelled => {
                info!("step '{}' cancelled", self.definition.id);
                builder.cancelled(CancelReason::Requested, None)
            }
        }
    }

    fn run_stages(&self, ctx: &Arc<ExecutionContext>, tracker: &mut PerformanceTracker) -> Stage {
        if ctx.is_cancelled() {
            return Stage::Cancelled;
        }

        let config = self.definition.execution.as_ref();

        // Concurrency bound, released when the guard drops.
        let _concurrency =
            match self.acquire_concurrency_slot(config.and_then(|c| c.max_concurrency)) {
                Ok(guard) => guard,
                Err(error) => {
                    let should_retry = error.is_retryable();
                    return Stage::Failure {
                        error,
                        should_retry,
                        retry_count: 0,
                    };
                }
            };

        if let Err(error) = validate_input(&self.definition, &ctx.input) {
            return Stage::Failure {
                error,
                should_retry: false,
                retry_count: 0,
            };
        }

        if let Some(condition) = &self.definition.condition {
            if !condition(&ctx.prior_outputs) {
                return Stage::Skipped;
            }
        }

        if ctx.is_cancelled() {
            return Stage::Cancelled;
        }

        let unit = self.build_unit();
        let outcome = unit(Arc::clone(ctx));

        // Snapshot the attempt counter now: an abandoned timeout worker
        // may keep retrying and advancing it after this point.
        let attempt = ctx.attempt();

        if let Ok(mut perf) = ctx.performance.lock() {
            tracker.sample(&mut perf);
        }

        // Cancellation observed during execution wins over the outcome.
        if ctx.is_cancelled() {
            return Stage::Cancelled;
        }

        match outcome {
            Ok(output) => {
                if let Err(error) = validate_output(&self.definition, &output) {
                    return Stage::Failure {
                        error,
                        should_retry: false,
                        retry_count: attempt.saturating_sub(1),
                    };
                }
                Stage::Success { output }
            }
            Err(error) => {
                let should_retry = self.decide_retry(attempt, &error);
                Stage::Failure {
                    error,
                    should_retry,
                    retry_count: attempt.saturating_sub(1),
                }
            }
        }
    }

    /// Builds the patterned execution unit:
    /// `timeout(retry(breaker(rate_limit + core)))`.
    fn build_unit(&self) -> ExecutableUnit {
        let definition = Arc::clone(&self.definition);
        let rate_window = Arc::clone(&self.rate_window);
        let rate_limit = self
            .definition
            .execution
            .as_ref()
            .and_then(|config| config.rate_limit.clone());

        let mut unit: ExecutableUnit = Arc::new(move |ctx: Arc<ExecutionContext>| {
            if let Some(rate) = &rate_limit {
                acquire_rate_slot(&rate_window, rate, &ctx.step_id)?;
            }
            (definition.run)(&ctx)
        });

        let Some(config) = self.definition.execution.as_ref() else {
            return unit;
        };

        if let Some(breaker) = &self.breaker {
            unit = with_circuit_breaker(unit, Arc::clone(breaker));
        }

        if let Some(retry) = &config.retry {
            unit = match &config.retry_if {
                Some(predicate) => with_retry_if(unit, retry.clone(), Arc::clone(predicate)),
                None => with_retry(unit, retry.clone()),
            };
        }

        if let Some(timeout_ms) = config.timeout_ms {
            unit = with_timeout(unit, Duration::from_millis(timeout_ms));
        }

        unit
    }

    /// Decides the `should_retry` flag on a failure result: the explicit
    /// predicate when supplied, else the error's own flag; and never once
    /// the configured attempt budget is spent.
    fn decide_retry(&self, attempt: u32, error: &WorkflowError) -> bool {
        let config = self.definition.execution.as_ref();

        let eligible = match config.and_then(|c| c.retry_if.as_ref()) {
            Some(predicate) => predicate(error),
            None => error.is_retryable(),
        };

        let budget_left = config
            .and_then(|c| c.retry.as_ref())
            .map(|retry| attempt < retry.max_attempts)
            .unwrap_or(true);

        eligible && budget_left
    }

    fn acquire_concurrency_slot(
        &self,
        max_concurrency: Option<u32>,
    ) -> Result<Option<ConcurrencyGuard>, WorkflowError> {
        let Some(max) = max_concurrency else {
            return Ok(None);
        };

        let previous = self.active_calls.fetch_add(1, Ordering::SeqCst);
        if previous >= max {
            self.active_calls.fetch_sub(1, Ordering::SeqCst);
            return Err(WorkflowError::retryable(
                &self.definition.id,
                format!("concurrency bound of {} reached", max),
            ));
        }

        Ok(Some(ConcurrencyGuard {
            counter: Arc::clone(&self.active_calls),
        }))
    }
}

impl fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepExecutor")
            .field("step_id", &self.definition.id)
            .field("breaker_state", &self.breaker.as_ref().map(|b| b.state()))
            .field(
                "execution_count",
                &self.execution_count.load(Ordering::Relaxed),
            )
            .field("has_progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

struct ConcurrencyGuard {
    counter: Arc<AtomicU32>,
}

impl Drop for ConcurrencyGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Admits a call through a sliding rate-limit window, or fails with a
/// retryable execution error so retry/backoff can wait the window out.
fn acquire_rate_slot(
    window: &Mutex<VecDeque<Instant>>,
    rate: &RateLimit,
    step_id: &str,
) -> Result<(), WorkflowError> {
    let mut guard = window
        .lock()
        .map_err(|_| WorkflowError::execution(step_id, "rate limit window lock poisoned"))?;

    let interval = Duration::from_millis(rate.interval_ms);
    while let Some(oldest) = guard.front() {
        if oldest.elapsed() > interval {
            guard.pop_front();
        } else {
            break;
        }
    }

    if guard.len() as u32 >= rate.max_calls {
        return Err(WorkflowError::retryable(
            step_id,
            format!(
                "rate limit of {} calls per {} ms exceeded",
                rate.max_calls, rate.interval_ms
            ),
        ));
    }

    guard.push_back(Instant::now());
    Ok(())
}

/// Serializes the step metadata into the context's metadata snapshot.
fn metadata_snapshot(definition: &StepDefinition) -> HashMap<String, Value> {
    match serde_json::to_value(&definition.metadata) {
        Ok(Value::Object(map)) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}
