//! Step Validation
//!
//! Two validation concerns live here:
//! - value validation: checking a step's input/output against an attached
//!   schema and/or custom predicates
//! - structural validation: checking a step definition's own invariants
//!   (non-empty id, positive timeouts, consistent retry bounds)
//!
//! Schemas are opaque collaborators; the engine only ever invokes them.

use serde_json::Value;
use std::sync::Arc;

use crate::error::WorkflowError;

use super::definition::StepDefinition;

/// Outcome of a schema validation call.
#[derive(Debug, Clone)]
pub struct SchemaReport {
    /// Whether the value passed validation
    pub success: bool,
    /// Messages describing each violation
    pub errors: Vec<String>,
}

impl SchemaReport {
    /// A passing report.
    pub fn ok() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
        }
    }

    /// A failing report with the given violations.
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
        }
    }
}

/// An opaque validation schema.
///
/// The engine never constructs schemas, only invokes them against step
/// input and output values.
pub trait Schema: Send + Sync {
    /// Validates a value, returning a report of any violations.
    fn validate(&self, value: &Value) -> SchemaReport;
}

/// A custom validation predicate over a value.
pub type CustomValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Runs a schema and a set of custom validators against a value,
/// collecting every violation rather than stopping at the first.
pub fn collect_issues(
    value: &Value,
    schema: Option<&Arc<dyn Schema>>,
    validators: &[CustomValidator],
) -> Vec<String> {
    let mut issues = Vec::new();

    if let Some(schema) = schema {
        let report = schema.validate(value);
        if !report.success {
            issues.extend(report.errors);
        }
    }

    for validator in validators {
        if let Err(message) = validator(value) {
            issues.push(message);
        }
    }

    issues
}

/// Validates a step's input value per its validation configuration.
pub fn validate_input(definition: &StepDefinition, input: &Value) -> Result<(), WorkflowError> {
    let Some(config) = &definition.validation else {
        return Ok(());
    };
    if !config.validate_input {
        return Ok(());
    }

    let issues = collect_issues(
        input,
        config.input_schema.as_ref(),
        &config.custom_validators,
    );
    if issues.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::InputValidation {
            step_id: definition.id.clone(),
            issues,
        })
    }
}

/// Validates a step's output value per its validation configuration.
pub fn validate_output(definition: &StepDefinition, output: &Value) -> Result<(), WorkflowError> {
    let Some(config) = &definition.validation else {
        return Ok(());
    };
    if !config.validate_output {
        return Ok(());
    }

    let issues = collect_issues(output, config.output_schema.as_ref(), &[]);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::OutputValidation {
            step_id: definition.id.clone(),
            issues,
        })
    }
}

/// Validates a step definition's structural invariants.
///
/// Collects every violation so callers see the full list at once:
/// - id, metadata name, and metadata version must be non-empty
/// - retry `max_attempts` must be at least 1
/// - timeout, rate-limit, and concurrency values must be strictly positive
pub fn validate_definition(definition: &StepDefinition) -> Result<(), WorkflowError> {
    let mut issues = Vec::new();

    if definition.id.trim().is_empty() {
        issues.push("step id must not be empty".to_string());
    }
    if definition.metadata.name.trim().is_empty() {
        issues.push("metadata name must not be empty".to_string());
    }
    if definition.metadata.version.trim().is_empty() {
        issues.push("metadata version must not be empty".to_string());
    }

    if let Some(config) = &definition.execution {
        if let Some(retry) = &config.retry {
            if retry.max_attempts < 1 {
                issues.push("retry max_attempts must be at least 1".to_string());
            }
        }
        if let Some(breaker) = &config.circuit_breaker {
            if breaker.failure_threshold == 0 {
                issues.push("circuit breaker failure_threshold must be positive".to_string());
            }
            if breaker.reset_timeout_ms == 0 {
                issues.push("circuit breaker reset_timeout_ms must be positive".to_string());
            }
        }
        if let Some(timeout_ms) = config.timeout_ms {
            if timeout_ms == 0 {
                issues.push("timeout_ms must be strictly positive".to_string());
            }
        }
        if let Some(rate) = &config.rate_limit {
            if rate.max_calls == 0 {
                issues.push("rate limit max_calls must be strictly positive".to_string());
            }
            if rate.interval_ms == 0 {
                issues.push("rate limit interval_ms must be strictly positive".to_string());
            }
        }
        if let Some(concurrency) = config.max_concurrency {
            if concurrency == 0 {
                issues.push("max_concurrency must be strictly positive".to_string());
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::InvalidDefinition {
            step_id: definition.id.clone(),
            issues,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Schema accepting only JSON objects; used across the crate's tests.
    pub struct ObjectSchema;

    impl Schema for ObjectSchema {
        fn validate(&self, value: &Value) -> SchemaReport {
            if value.is_object() {
                SchemaReport::ok()
            } else {
                SchemaReport::failed(vec!["expected an object".to_string()])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ObjectSchema;
    use super::*;
    use crate::resilience::retry::RetryPolicy;
    use crate::resilience::breaker::BreakerPolicy;
    use crate::step::definition::{ExecutionConfig, RateLimit, StepDefinition, ValidationConfig};
    use crate::step::metadata::StepMetadata;
    use serde_json::json;

    fn minimal_definition(id: &str) -> StepDefinition {
        StepDefinition::new(id, StepMetadata::new("test", "1.0.0"), |ctx| {
            Ok(ctx.input.clone())
        })
    }

    #[test]
    fn test_collect_issues_schema_failure() {
        let schema: Arc<dyn Schema> = Arc::new(ObjectSchema);
        let issues = collect_issues(&json!(42), Some(&schema), &[]);
        assert_eq!(issues, vec!["expected an object"]);
    }

    #[test]
    fn test_collect_issues_custom_validator() {
        let validator: CustomValidator = Arc::new(|value| {
            if value.get("count").is_some() {
                Ok(())
            } else {
                Err("missing 'count'".to_string())
            }
        });
        let issues = collect_issues(&json!({}), None, &[validator]);
        assert_eq!(issues, vec!["missing 'count'"]);
    }

    #[test]
    fn test_collect_issues_accumulates_all() {
        let schema: Arc<dyn Schema> = Arc::new(ObjectSchema);
        let validator: CustomValidator = Arc::new(|_| Err("always fails".to_string()));
        let issues = collect_issues(&json!("text"), Some(&schema), &[validator]);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_validate_input_disabled() {
        let def = minimal_definition("s1").with_validation_config(
            ValidationConfig::new()
                .with_input_schema(Arc::new(ObjectSchema))
                .skip_input_validation(),
        );
        assert!(validate_input(&def, &json!(7)).is_ok());
    }

    #[test]
    fn test_validate_input_failure_code() {
        let def = minimal_definition("s1").with_validation_config(
            ValidationConfig::new().with_input_schema(Arc::new(ObjectSchema)),
        );
        let err = validate_input(&def, &json!(7)).unwrap_err();
        assert_eq!(err.code(), "STEP_INPUT_VALIDATION_ERROR");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validate_output_failure_code() {
        let def = minimal_definition("s1").with_validation_config(
            ValidationConfig::new().with_output_schema(Arc::new(ObjectSchema)),
        );
        let err = validate_output(&def, &json!([])).unwrap_err();
        assert_eq!(err.code(), "STEP_OUTPUT_VALIDATION_ERROR");
    }

    #[test]
    fn test_validate_definition_ok() {
        let def = minimal_definition("s1").with_execution_config(
            ExecutionConfig::new()
                .with_retry(RetryPolicy::new(3))
                .with_timeout_ms(5_000),
        );
        assert!(validate_definition(&def).is_ok());
    }

    #[test]
    fn test_validate_definition_empty_id() {
        let def = minimal_definition("   ");
        let err = validate_definition(&def).unwrap_err();
        assert_eq!(err.code(), "INVALID_STEP_DEFINITION");
        assert!(err.to_string().contains("id must not be empty"));
    }

    #[test]
    fn test_validate_definition_collects_all_issues() {
        let def = minimal_definition("s1").with_execution_config(
            ExecutionConfig::new()
                .with_timeout_ms(0)
                .with_rate_limit(RateLimit {
                    max_calls: 0,
                    interval_ms: 0,
                })
                .with_max_concurrency(0),
        );
        let err = validate_definition(&def).unwrap_err();
        match err {
            WorkflowError::InvalidDefinition { issues, .. } => {
                assert_eq!(issues.len(), 4);
            }
            other => panic!("expected InvalidDefinition, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_definition_zero_breaker_threshold() {
        let def = minimal_definition("s1").with_execution_config(
            ExecutionConfig::new().with_circuit_breaker(BreakerPolicy {
                failure_threshold: 0,
                reset_timeout_ms: 1_000,
            }),
        );
        assert!(validate_definition(&def).is_err());
    }
}
