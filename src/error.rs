//! Error Taxonomy
//!
//! All failures raised by the engine, registry, and resilience layers are
//! classified by a stable code rather than by type. Execution-time errors
//! are captured into `failure` results; registry and structural errors are
//! returned synchronously to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified error for step execution and registry operations.
///
/// Each variant maps to exactly one stable code (see [`WorkflowError::code`])
/// and carries the originating step id where one exists.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum WorkflowError {
    /// Input value rejected by schema or custom validation.
    #[error("step '{step_id}': input validation failed: {}", issues.join("; "))]
    InputValidation { step_id: String, issues: Vec<String> },

    /// Output value rejected by schema or custom validation.
    #[error("step '{step_id}': output validation failed: {}", issues.join("; "))]
    OutputValidation { step_id: String, issues: Vec<String> },

    /// The step's core function failed.
    #[error("step '{step_id}': {message}")]
    Execution {
        step_id: String,
        message: String,
        retryable: bool,
    },

    /// The step did not complete within its configured timeout.
    #[error("step '{step_id}': timed out after {timeout_ms} ms")]
    Timeout { step_id: String, timeout_ms: u64 },

    /// The circuit breaker is open; the call was not attempted.
    #[error("step '{step_id}': circuit breaker is open")]
    CircuitBreakerOpen { step_id: String },

    /// A step definition violates its structural invariants.
    #[error("invalid step definition '{step_id}': {}", issues.join("; "))]
    InvalidDefinition { step_id: String, issues: Vec<String> },

    /// A step with this id is already registered.
    #[error("step '{step_id}' is already registered")]
    DuplicateStep { step_id: String },

    /// No active step with this id exists in the registry.
    #[error("step '{step_id}' not found")]
    StepNotFound { step_id: String },
}

impl WorkflowError {
    /// Creates a non-retryable execution error.
    pub fn execution(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            step_id: step_id.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a retryable execution error.
    pub fn retryable(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            step_id: step_id.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a timeout error (always retryable).
    pub fn timeout(step_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            step_id: step_id.into(),
            timeout_ms,
        }
    }

    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InputValidation { .. } => "STEP_INPUT_VALIDATION_ERROR",
            Self::OutputValidation { .. } => "STEP_OUTPUT_VALIDATION_ERROR",
            Self::Execution { .. } => "STEP_EXECUTION_ERROR",
            Self::Timeout { .. } => "STEP_TIMEOUT_ERROR",
            Self::CircuitBreakerOpen { .. } => "CIRCUIT_BREAKER_OPEN",
            Self::InvalidDefinition { .. } => "INVALID_STEP_DEFINITION",
            Self::DuplicateStep { .. } => "DUPLICATE_STEP",
            Self::StepNotFound { .. } => "STEP_NOT_FOUND",
        }
    }

    /// Returns the id of the step this error originated from.
    pub fn step_id(&self) -> &str {
        match self {
            Self::InputValidation { step_id, .. }
            | Self::OutputValidation { step_id, .. }
            | Self::Execution { step_id, .. }
            | Self::Timeout { step_id, .. }
            | Self::CircuitBreakerOpen { step_id }
            | Self::InvalidDefinition { step_id, .. }
            | Self::DuplicateStep { step_id }
            | Self::StepNotFound { step_id } => step_id,
        }
    }

    /// Returns whether re-invoking the operation could plausibly succeed.
    ///
    /// Timeouts are retryable; execution errors carry their own flag;
    /// validation, breaker-open, and structural errors never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Execution { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = WorkflowError::timeout("s1", 500);
        assert_eq!(err.code(), "STEP_TIMEOUT_ERROR");

        let err = WorkflowError::DuplicateStep {
            step_id: "s1".into(),
        };
        assert_eq!(err.code(), "DUPLICATE_STEP");

        let err = WorkflowError::CircuitBreakerOpen {
            step_id: "s1".into(),
        };
        assert_eq!(err.code(), "CIRCUIT_BREAKER_OPEN");
    }

    #[test]
    fn test_retryability_defaults() {
        assert!(WorkflowError::timeout("s", 10).is_retryable());
        assert!(WorkflowError::retryable("s", "flaky").is_retryable());
        assert!(!WorkflowError::execution("s", "broken").is_retryable());
        assert!(!WorkflowError::InputValidation {
            step_id: "s".into(),
            issues: vec!["bad".into()],
        }
        .is_retryable());
        assert!(!WorkflowError::CircuitBreakerOpen {
            step_id: "s".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_step_id_accessor() {
        let err = WorkflowError::execution("align", "boom");
        assert_eq!(err.step_id(), "align");
    }

    #[test]
    fn test_display_includes_issues() {
        let err = WorkflowError::InvalidDefinition {
            step_id: "s1".into(),
            issues: vec!["empty id".into(), "zero timeout".into()],
        };
        let text = err.to_string();
        assert!(text.contains("empty id"));
        assert!(text.contains("zero timeout"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let err = WorkflowError::timeout("s1", 250);
        let json = serde_json::to_string(&err).unwrap();
        let back: WorkflowError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
