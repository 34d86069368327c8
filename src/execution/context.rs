//! Execution Context
//!
//! Per-call state threaded through a step execution: the input value,
//! snapshots of prior outputs and metadata, the attempt counter, the
//! cancellation signal, and shared performance data. A context is created
//! once per execution call and never reused.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use crate::monitoring::PerformanceData;

/// Callback reporting progress as (current, total).
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Cooperative cancellation signal.
///
/// Cloning shares the underlying flag. The engine and enhancers check it
/// at entry and at coarse boundaries; an in-flight core call is never
/// aborted, only no longer waited for.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    flag: Arc<AtomicBool>,
}

impl CancellationSignal {
    /// Creates a signal in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Per-execution state passed to the step function and enhancers.
pub struct ExecutionContext {
    /// Opaque id unique to this execution call
    pub execution_id: String,

    /// Id of the step being executed
    pub step_id: String,

    /// Caller-supplied correlation key for the surrounding workflow run
    pub workflow_execution_id: String,

    /// The step's input value
    pub input: Value,

    /// Immutable snapshot of prior steps' outputs, keyed by step id
    pub prior_outputs: HashMap<String, Value>,

    /// Immutable metadata snapshot
    pub metadata: HashMap<String, Value>,

    /// Cancellation signal for this execution
    pub cancellation: CancellationSignal,

    /// Performance data, mutated in place during execution
    pub performance: Mutex<PerformanceData>,

    /// Optional progress-reporting callback
    pub progress_callback: Option<ProgressCallback>,

    // Advanced only by the retry enhancer to reflect the active attempt.
    attempt: AtomicU32,
}

impl ExecutionContext {
    /// Creates a context for one execution call.
    pub fn new(
        step_id: impl Into<String>,
        workflow_execution_id: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            step_id: step_id.into(),
            workflow_execution_id: workflow_execution_id.into(),
            input,
            prior_outputs: HashMap::new(),
            metadata: HashMap::new(),
            cancellation: CancellationSignal::new(),
            performance: Mutex::new(PerformanceData::new()),
            progress_callback: None,
            attempt: AtomicU32::new(1),
        }
    }

    /// Sets the prior-outputs snapshot.
    pub fn with_prior_outputs(mut self, prior: HashMap<String, Value>) -> Self {
        self.prior_outputs = prior;
        self
    }

    /// Sets the metadata snapshot.
    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attaches a cancellation signal.
    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Attaches a progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Returns the active attempt number (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Relaxed)
    }

    /// Sets the active attempt number. Called by the retry enhancer.
    pub fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Relaxed);
    }

    /// Returns true if this execution has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Updates the progress cursor and notifies the callback, if any.
    pub fn report_progress(&self, current: u64, total: u64) {
        if let Ok(mut perf) = self.performance.lock() {
            perf.set_progress(current, total);
        }
        if let Some(callback) = &self.progress_callback {
            callback(current, total);
        }
    }
}
