//! Execution Result Model
//!
//! A discriminated result for step executions: exactly one of success,
//! failure, skipped, cancelled, or pending, with shared identification and
//! performance fields. Results are constructed once per execution attempt
//! and never mutated by downstream consumers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowError;
use crate::monitoring::PerformanceData;

use super::context::ExecutionContext;

/// Why a failure outcome occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Validation,
    Execution,
    Timeout,
    CircuitBreaker,
}

/// Why a step was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ConditionNotMet,
    Manual,
}

/// Why a step was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Requested,
    Shutdown,
}

/// Why a step is still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingReason {
    Scheduled,
    WaitingOnDependencies,
    Deferred,
}

/// The discriminated outcome of an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        output: Value,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Failure {
        error: WorkflowError,
        should_retry: bool,
        retry_count: u32,
        reason: FailureReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partial_output: Option<Value>,
    },
    Skipped {
        reason: SkipReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    Cancelled {
        reason: CancelReason,
        cancelled_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actor: Option<String>,
    },
    Pending {
        reason: PendingReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        eta_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent_complete: Option<f64>,
    },
}

/// The full result of one execution attempt.
///
/// Shared fields identify the execution; the [`Outcome`] carries the
/// variant-specific payload. Consumers match on `outcome` exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Id of the execution call that produced this result
    pub execution_id: String,

    /// Id of the executed step
    pub step_id: String,

    /// Caller-supplied workflow correlation key
    pub workflow_execution_id: String,

    /// When the result was constructed
    pub timestamp: DateTime<Utc>,

    /// Performance data captured during the execution
    pub performance: PerformanceData,

    /// Metadata snapshot from the execution context
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,

    /// The discriminated outcome
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ExecutionResult {
    /// Returns a short label for the outcome variant.
    pub fn status(&self) -> &'static str {
        match &self.outcome {
            Outcome::Success { .. } => "success",
            Outcome::Failure { .. } => "failure",
            Outcome::Skipped { .. } => "skipped",
            Outcome::Cancelled { .. } => "cancelled",
            Outcome::Pending { .. } => "pending",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failure { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, Outcome::Cancelled { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.outcome, Outcome::Pending { .. })
    }

    /// Returns true for terminal non-error outcomes (success or skipped).
    pub fn is_terminal_success(&self) -> bool {
        self.is_success() || self.is_skipped()
    }

    /// Returns the output value for success outcomes.
    pub fn output(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Returns the error for failure outcomes.
    pub fn error(&self) -> Option<&WorkflowError> {
        match &self.outcome {
            Outcome::Failure { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns whether a failure outcome is eligible for retry.
    pub fn should_retry(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::Failure {
                should_retry: true,
                ..
            }
        )
    }

    /// Returns the warnings attached to a success outcome.
    pub fn warnings(&self) -> &[String] {
        match &self.outcome {
            Outcome::Success { warnings, .. } => warnings,
            _ => &[],
        }
    }
}

/// Builds an [`ExecutionResult`] from an execution context.
///
/// Snapshots the context's identification, metadata, and performance data
/// at construction time, then produces exactly one result variant.
pub struct ResultBuilder {
    execution_id: String,
    step_id: String,
    workflow_execution_id: String,
    metadata: HashMap<String, Value>,
    performance: PerformanceData,
}

impl ResultBuilder {
    /// Creates a builder snapshotting the given context.
    pub fn from_context(ctx: &ExecutionContext) -> Self {
        let performance = ctx
            .performance
            .lock()
            .map(|data| data.clone())
            .unwrap_or_default();

        Self {
            execution_id: ctx.execution_id.clone(),
            step_id: ctx.step_id.clone(),
            workflow_execution_id: ctx.workflow_execution_id.clone(),
            metadata: ctx.metadata.clone(),
            performance,
        }
    }

    fn finish(self, outcome: Outcome) -> ExecutionResult {
        ExecutionResult {
            execution_id: self.execution_id,
            step_id: self.step_id,
            workflow_execution_id: self.workflow_execution_id,
            timestamp: Utc::now(),
            performance: self.performance,
            metadata: self.metadata,
            outcome,
        }
    }

    /// Builds a success result.
    pub fn success(self, output: Value) -> ExecutionResult {
        self.finish(Outcome::Success {
            output,
            warnings: Vec::new(),
        })
    }

    /// Builds a success result carrying warnings.
    pub fn success_with_warnings(self, output: Value, warnings: Vec<String>) -> ExecutionResult {
        self.finish(Outcome::Success { output, warnings })
    }

    /// Builds a failure result; the reason is derived from the error code.
    pub fn failure(
        self,
        error: WorkflowError,
        should_retry: bool,
        retry_count: u32,
    ) -> ExecutionResult {
        let reason = failure_reason_for(&error);
        self.finish(Outcome::Failure {
            error,
            should_retry,
            retry_count,
            reason,
            partial_output: None,
        })
    }

    /// Builds a failure result carrying a partial output.
    pub fn failure_with_partial(
        self,
        error: WorkflowError,
        should_retry: bool,
        retry_count: u32,
        partial_output: Value,
    ) -> ExecutionResult {
        let reason = failure_reason_for(&error);
        self.finish(Outcome::Failure {
            error,
            should_retry,
            retry_count,
            reason,
            partial_output: Some(partial_output),
        })
    }

    /// Builds a skipped result.
    pub fn skipped(self, reason: SkipReason, details: Option<String>) -> ExecutionResult {
        self.finish(Outcome::Skipped { reason, details })
    }

    /// Builds a cancelled result timestamped now.
    pub fn cancelled(self, reason: CancelReason, actor: Option<String>) -> ExecutionResult {
        self.finish(Outcome::Cancelled {
            reason,
            cancelled_at: Utc::now(),
            actor,
        })
    }

    /// Builds a pending result.
    pub fn pending(
        self,
        reason: PendingReason,
        eta_ms: Option<u64>,
        percent_complete: Option<f64>,
    ) -> ExecutionResult {
        self.finish(Outcome::Pending {
            reason,
            eta_ms,
            percent_complete,
        })
    }
}

/// Maps an error to the failure-reason tag used in results.
pub fn failure_reason_for(error: &WorkflowError) -> FailureReason {
    match error {
        WorkflowError::InputValidation { .. } | WorkflowError::OutputValidation { .. } => {
            FailureReason::Validation
        }
        WorkflowError::Timeout { .. } => FailureReason::Timeout,
        WorkflowError::CircuitBreakerOpen { .. } => FailureReason::CircuitBreaker,
        _ => FailureReason::Execution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> ResultBuilder {
        let ctx = ExecutionContext::new("align", "wf-1", json!(1));
        ResultBuilder::from_context(&ctx)
    }

    #[test]
    fn test_success_result() {
        let result = builder().success(json!({"rows": 10}));

        assert!(result.is_success());
        assert!(result.is_terminal_success());
        assert_eq!(result.status(), "success");
        assert_eq!(result.output(), Some(&json!({"rows": 10})));
        assert!(result.warnings().is_empty());
        assert_eq!(result.step_id, "align");
    }

    #[test]
    fn test_success_with_warnings() {
        let result =
            builder().success_with_warnings(json!(null), vec!["low coverage".to_string()]);
        assert_eq!(result.warnings(), ["low coverage"]);
    }

    #[test]
    fn test_failure_result_reason_derivation() {
        let result = builder().failure(WorkflowError::timeout("align", 100), true, 2);

        assert!(result.is_failure());
        assert!(result.should_retry());
        match &result.outcome {
            Outcome::Failure {
                reason,
                retry_count,
                ..
            } => {
                assert_eq!(*reason, FailureReason::Timeout);
                assert_eq!(*retry_count, 2);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_failure_reason() {
        let err = WorkflowError::InputValidation {
            step_id: "align".into(),
            issues: vec!["bad".into()],
        };
        let result = builder().failure(err, false, 0);
        match &result.outcome {
            Outcome::Failure { reason, .. } => assert_eq!(*reason, FailureReason::Validation),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_failure_with_partial_output() {
        let result = builder().failure_with_partial(
            WorkflowError::retryable("align", "interrupted"),
            true,
            1,
            json!({"rows": 4}),
        );
        match &result.outcome {
            Outcome::Failure { partial_output, .. } => {
                assert_eq!(partial_output.as_ref(), Some(&json!({"rows": 4})));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_skipped_is_terminal_success() {
        let result = builder().skipped(SkipReason::ConditionNotMet, None);
        assert!(result.is_skipped());
        assert!(result.is_terminal_success());
        assert!(!result.is_failure());
    }

    #[test]
    fn test_cancelled_result() {
        let result = builder().cancelled(CancelReason::Requested, Some("operator".into()));
        assert!(result.is_cancelled());
        assert_eq!(result.status(), "cancelled");
        match &result.outcome {
            Outcome::Cancelled { actor, .. } => {
                assert_eq!(actor.as_deref(), Some("operator"));
            }
            other => panic!("expected cancelled, got {:?}", other),
        }
    }

    #[test]
    fn test_pending_result() {
        let result = builder().pending(PendingReason::Scheduled, Some(5_000), Some(0.25));
        assert!(result.is_pending());
        assert!(!result.is_terminal_success());
    }

    #[test]
    fn test_status_tag_in_json() {
        let result = builder().success(json!(1));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "success");

        let result = builder().skipped(SkipReason::ConditionNotMet, None);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "condition_not_met");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let result = builder().failure(WorkflowError::execution("align", "boom"), false, 0);
        let json = serde_json::to_string(&result).unwrap();
        let back: ExecutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
