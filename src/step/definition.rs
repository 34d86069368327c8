//! Step Definition
//!
//! The declarative description of one governed unit of work: an execution
//! function plus metadata, dependencies, an optional condition and cleanup
//! hook, and policy configuration for resilience and validation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowError;
use crate::execution::context::ExecutionContext;
use crate::resilience::breaker::BreakerPolicy;
use crate::resilience::retry::{RetryPolicy, RetryPredicate};

use super::metadata::StepMetadata;
use super::validation::{CustomValidator, Schema};

/// Result of a step's core execution function.
pub type StepOutput = Result<Value, WorkflowError>;

/// The core execution function of a step.
pub type StepFn = Arc<dyn Fn(&ExecutionContext) -> StepOutput + Send + Sync>;

/// Condition predicate over the prior-context snapshot.
///
/// Returning `false` skips the step; skipping is a successful, terminal
/// outcome, not an error.
pub type ConditionFn = Arc<dyn Fn(&HashMap<String, Value>) -> bool + Send + Sync>;

/// Cleanup hook invoked after execution regardless of outcome.
pub type CleanupFn = Arc<dyn Fn(&ExecutionContext) -> Result<(), WorkflowError> + Send + Sync>;

/// Rate-limit bounds: at most `max_calls` within a sliding `interval_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_calls: u32,
    pub interval_ms: u64,
}

/// Resilience and resource policy for a step.
#[derive(Clone, Default)]
pub struct ExecutionConfig {
    /// Retry-with-backoff policy
    pub retry: Option<RetryPolicy>,
    /// Circuit breaker policy
    pub circuit_breaker: Option<BreakerPolicy>,
    /// Wall-clock bound over the entire retry sequence, in milliseconds
    pub timeout_ms: Option<u64>,
    /// Sliding-window rate limit
    pub rate_limit: Option<RateLimit>,
    /// Maximum concurrent executions of this step per executor
    pub max_concurrency: Option<u32>,
    /// Overrides error-level retryability when deciding whether to retry
    pub retry_if: Option<RetryPredicate>,
}

impl ExecutionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the circuit breaker policy.
    pub fn with_circuit_breaker(mut self, policy: BreakerPolicy) -> Self {
        self.circuit_breaker = Some(policy);
        self
    }

    /// Sets the overall timeout in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets the rate limit bounds.
    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Sets the concurrency bound.
    pub fn with_max_concurrency(mut self, max_concurrency: u32) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    /// Sets the retry-decision predicate.
    pub fn with_retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&WorkflowError) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for ExecutionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionConfig")
            .field("retry", &self.retry)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("timeout_ms", &self.timeout_ms)
            .field("rate_limit", &self.rate_limit)
            .field("max_concurrency", &self.max_concurrency)
            .field("retry_if", &self.retry_if.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

/// Validation policy for a step's input and output values.
#[derive(Clone)]
pub struct ValidationConfig {
    /// Schema applied to the input value
    pub input_schema: Option<Arc<dyn Schema>>,
    /// Schema applied to the output value
    pub output_schema: Option<Arc<dyn Schema>>,
    /// Custom predicates applied to the input value
    pub custom_validators: Vec<CustomValidator>,
    /// Whether input validation runs (default on)
    pub validate_input: bool,
    /// Whether output validation runs (default on)
    pub validate_output: bool,
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the input schema.
    pub fn with_input_schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Sets the output schema.
    pub fn with_output_schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Adds a custom input validator.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.custom_validators.push(Arc::new(validator));
        self
    }

    /// Disables input validation.
    pub fn skip_input_validation(mut self) -> Self {
        self.validate_input = false;
        self
    }

    /// Disables output validation.
    pub fn skip_output_validation(mut self) -> Self {
        self.validate_output = false;
        self
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            input_schema: None,
            output_schema: None,
            custom_validators: Vec::new(),
            validate_input: true,
            validate_output: true,
        }
    }
}

impl fmt::Debug for ValidationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationConfig")
            .field("input_schema", &self.input_schema.as_ref().map(|_| "<schema>"))
            .field("output_schema", &self.output_schema.as_ref().map(|_| "<schema>"))
            .field("custom_validators", &self.custom_validators.len())
            .field("validate_input", &self.validate_input)
            .field("validate_output", &self.validate_output)
            .finish()
    }
}

/// A complete step definition.
///
/// The id is immutable and must be unique within a registry; the execution
/// function is required, everything else is optional policy.
///
/// # Example
///
/// ```
/// use stepwise::step::{StepDefinition, StepMetadata};
/// use serde_json::json;
///
/// let step = StepDefinition::new(
///     "double",
///     StepMetadata::new("double", "1.0.0"),
///     |ctx| {
///         let n = ctx.input.as_i64().unwrap_or(0);
///         Ok(json!(n * 2))
///     },
/// )
/// .depends_on("load");
///
/// assert_eq!(step.dependencies, vec!["load"]);
/// ```
#[derive(Clone)]
pub struct StepDefinition {
    /// Unique identifier for this step
    pub id: String,

    /// Descriptive metadata
    pub metadata: StepMetadata,

    /// The core execution function
    pub run: StepFn,

    /// Ids of steps whose outputs this step depends on
    pub dependencies: Vec<String>,

    /// Optional condition gating execution
    pub condition: Option<ConditionFn>,

    /// Optional cleanup hook, run regardless of outcome
    pub cleanup: Option<CleanupFn>,

    /// Optional resilience policy
    pub execution: Option<ExecutionConfig>,

    /// Optional validation policy
    pub validation: Option<ValidationConfig>,
}

impl StepDefinition {
    /// Creates a definition with the required id, metadata, and function.
    pub fn new<F>(id: impl Into<String>, metadata: StepMetadata, run: F) -> Self
    where
        F: Fn(&ExecutionContext) -> StepOutput + Send + Sync + 'static,
    {
        Self {
            id: id.into().trim().to_string(),
            metadata,
            run: Arc::new(run),
            dependencies: Vec::new(),
            condition: None,
            cleanup: None,
            execution: None,
            validation: None,
        }
    }

    /// Adds a dependency on another step.
    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    /// Sets the condition predicate.
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&HashMap<String, Value>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Sets the cleanup hook.
    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<(), WorkflowError> + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(cleanup));
        self
    }

    /// Sets the resilience policy.
    pub fn with_execution_config(mut self, config: ExecutionConfig) -> Self {
        self.execution = Some(config);
        self
    }

    /// Sets the validation policy.
    pub fn with_validation_config(mut self, config: ValidationConfig) -> Self {
        self.validation = Some(config);
        self
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("metadata", &self.metadata)
            .field("dependencies", &self.dependencies)
            .field("condition", &self.condition.as_ref().map(|_| "<predicate>"))
            .field("cleanup", &self.cleanup.as_ref().map(|_| "<hook>"))
            .field("execution", &self.execution)
            .field("validation", &self.validation)
            .finish()
    }
}
