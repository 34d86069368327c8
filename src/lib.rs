//! Stepwise - Step Execution and Resilience Engine
//!
//! A library for defining governed units of work (steps) and executing
//! them through composable resilience patterns: retry with backoff,
//! circuit breaking, timeouts, and monitoring. Steps are catalogued in a
//! registry and scheduled by a dependency planner.
//!
//! # Architecture
//!
//! The library is organized into five main modules:
//!
//! - [`step`]: step definitions, metadata, and validation
//! - [`execution`]: the execution engine, context, and result model
//! - [`resilience`]: composable enhancers wrapped around a step's core
//! - [`registry`]: the step catalogue and the dependency planner
//! - [`monitoring`]: per-execution performance and progress capture
//!
//! # Example
//!
//! ```
//! use stepwise::registry::{create_execution_plan, PlanOptions, StepRegistry};
//! use stepwise::execution::CancellationSignal;
//! use stepwise::step::{StepDefinition, StepMetadata};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! let mut registry = StepRegistry::new();
//! registry.register(StepDefinition::new(
//!     "double",
//!     StepMetadata::new("double", "1.0.0"),
//!     |ctx| Ok(json!(ctx.input.as_i64().unwrap_or(0) * 2)),
//! ))?;
//!
//! let plan = create_execution_plan(&registry, &["double"], &PlanOptions::default());
//! assert_eq!(plan.ordered, vec!["double"]);
//!
//! let executor = registry.create_executable_step("double")?;
//! let result = executor.execute(
//!     json!(21),
//!     "wf-1",
//!     HashMap::new(),
//!     HashMap::new(),
//!     CancellationSignal::new(),
//! );
//! assert_eq!(result.output(), Some(&json!(42)));
//! # Ok::<(), stepwise::WorkflowError>(())
//! ```

pub mod error;
pub mod execution;
pub mod monitoring;
pub mod registry;
pub mod resilience;
pub mod step;

// Re-export commonly used types
pub use error::WorkflowError;
pub use execution::{CancellationSignal, ExecutionContext, ExecutionResult, Outcome, StepExecutor};
pub use registry::{create_execution_plan, ExecutionPlan, PlanOptions, StepFilter, StepRegistry};
pub use step::{StepDefinition, StepMetadata};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
