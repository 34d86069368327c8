//! Execution Monitoring Module
//!
//! Provides per-execution performance capture: timestamps, memory and CPU
//! deltas, a progress cursor, and open-ended custom metrics.
//!
//! # Components
//!
//! - [`PerformanceData`]: the data recorded for one execution
//! - [`PerformanceTracker`]: sysinfo-backed sampler for the current process

pub mod performance;

pub use performance::{
    current_memory_mb, PerformanceData, PerformanceTracker, ProgressCursor, ProgressState,
};
