//! Performance and Progress Tracking
//!
//! Captures start/end timestamps, memory/CPU deltas, and a progress cursor
//! for a single execution. Pure data plus update functions; the data is
//! read-only once the engine returns it inside a result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{get_current_pid, Pid, ProcessRefreshKind, System};

/// Lifecycle state of an execution's progress cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

/// Position within a multi-part execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressCursor {
    /// Units of work finished so far
    pub current: u64,
    /// Total units of work, if known
    pub total: u64,
    /// Current lifecycle state
    pub state: ProgressState,
}

impl Default for ProgressCursor {
    fn default() -> Self {
        Self {
            current: 0,
            total: 0,
            state: ProgressState::Pending,
        }
    }
}

/// Performance data for one execution.
///
/// Mutated in place while the step runs; immutable once attached to a
/// result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceData {
    /// When the execution started
    pub started_at: DateTime<Utc>,

    /// When the execution ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Wall-clock duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Process memory before execution, in megabytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_before_mb: Option<u64>,

    /// Process memory after execution, in megabytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_after_mb: Option<u64>,

    /// Peak process memory observed, in megabytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_peak_mb: Option<u64>,

    /// CPU usage percentage before execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_before: Option<f32>,

    /// CPU usage percentage after execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_after: Option<f32>,

    /// Progress cursor for the execution
    #[serde(default)]
    pub progress: ProgressCursor,

    /// Open-ended named metrics (name -> numeric value)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_metrics: HashMap<String, f64>,
}

impl PerformanceData {
    /// Creates performance data starting now.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            memory_before_mb: None,
            memory_after_mb: None,
            memory_peak_mb: None,
            cpu_before: None,
            cpu_after: None,
            progress: ProgressCursor::default(),
            custom_metrics: HashMap::new(),
        }
    }

    /// Updates the progress cursor position.
    pub fn set_progress(&mut self, current: u64, total: u64) {
        self.progress.current = current;
        self.progress.total = total;
    }

    /// Sets the progress lifecycle state.
    pub fn set_progress_state(&mut self, state: ProgressState) {
        self.progress.state = state;
    }

    /// Records a named metric value.
    pub fn record_metric(&mut self, name: impl Into<String>, value: f64) {
        self.custom_metrics.insert(name.into(), value);
    }

    /// Marks the execution as ended and computes the duration.
    pub fn mark_ended(&mut self) {
        let now = Utc::now();
        self.ended_at = Some(now);
        let elapsed = now.signed_duration_since(self.started_at);
        self.duration_ms = Some(elapsed.num_milliseconds().max(0) as u64);
    }

    /// Returns true if the execution has ended.
    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }
}

impl Default for PerformanceData {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples memory and CPU usage for the current process.
///
/// Used by the execution engine to populate the before/after/peak fields
/// of [`PerformanceData`]. The first refresh acts as a CPU warmup, so
/// `begin` should be called once before any `sample`/`finish`.
pub struct PerformanceTracker {
    system: System,
    process_id: Option<Pid>,
}

impl PerformanceTracker {
    /// Creates a tracker for the current process.
    pub fn new() -> Self {
        Self {
            system: System::new(),
            process_id: get_current_pid().ok(),
        }
    }

    /// Captures the before-execution memory and CPU values.
    pub fn begin(&mut self, data: &mut PerformanceData) {
        if let Some((mem_mb, cpu)) = self.read() {
            data.memory_before_mb = Some(mem_mb);
            data.memory_peak_mb = Some(mem_mb);
            data.cpu_before = Some(cpu);
        }
    }

    /// Updates the peak memory value if the current usage is higher.
    pub fn sample(&mut self, data: &mut PerformanceData) {
        if let Some((mem_mb, _)) = self.read() {
            let peak = data.memory_peak_mb.unwrap_or(0);
            if mem_mb > peak {
                data.memory_peak_mb = Some(mem_mb);
            }
        }
    }

    /// Captures the after-execution values and closes the timing window.
    pub fn finish(&mut self, data: &mut PerformanceData) {
        if let Some((mem_mb, cpu)) = self.read() {
            data.memory_after_mb = Some(mem_mb);
            data.cpu_after = Some(cpu);
            let peak = data.memory_peak_mb.unwrap_or(0);
            if mem_mb > peak {
                data.memory_peak_mb = Some(mem_mb);
            }
        }
        data.mark_ended();
    }

    fn read(&mut self) -> Option<(u64, f32)> {
        let pid = self.process_id?;
        let refresh_kind = ProcessRefreshKind::new().with_cpu().with_memory();
        self.system.refresh_processes_specifics(refresh_kind);
        let process = self.system.process(pid)?;
        Some((process.memory() / (1024 * 1024), process.cpu_usage()))
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the current process memory usage in megabytes, if readable.
pub fn current_memory_mb() -> Option<u64> {
    let pid = get_current_pid().ok()?;
    let mut system = System::new();
    let refresh_kind = ProcessRefreshKind::new().with_memory();
    system.refresh_processes_specifics(refresh_kind);
    system.process(pid).map(|p| p.memory() / (1024 * 1024))
}
