//! Step Execution
//!
//! This module contains the execution-time half of the crate:
//! - [`context`] - per-call execution context and cancellation signal
//! - [`engine`] - the step executor state machine
//! - [`result`] - the five-variant execution result model

pub mod context;
pub mod engine;
pub mod result;

pub use context::{CancellationSignal, ExecutionContext, ProgressCallback};
pub use engine::StepExecutor;
pub use result::{
    CancelReason, ExecutionResult, FailureReason, Outcome, PendingReason, ResultBuilder,
    SkipReason,
};
