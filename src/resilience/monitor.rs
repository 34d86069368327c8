//! Monitoring Enhancer
//!
//! Wraps a unit with before/after performance capture and an optional
//! completion callback. Purely observational: the wrapped unit's outcome
//! is returned unchanged.

use std::sync::Arc;
use std::time::Instant;

use log::debug;

use crate::monitoring::current_memory_mb;

use super::ExecutableUnit;

/// Completion callback: (name, duration in ms, success).
pub type MonitorCallback = Arc<dyn Fn(&str, u64, bool) + Send + Sync>;

/// Wraps a unit with duration and memory capture under the given name.
///
/// The duration lands in the context's custom metrics as
/// `<name>.duration_ms`; the peak-memory field is raised if the post-call
/// sample exceeds it. The callback, if any, fires after every call.
pub fn with_monitoring(
    unit: ExecutableUnit,
    name: impl Into<String>,
    callback: Option<MonitorCallback>,
) -> ExecutableUnit {
    let name = name.into();

    Arc::new(move |ctx| {
        let start = Instant::now();
        let result = unit(Arc::clone(&ctx));
        let duration_ms = start.elapsed().as_millis() as u64;
        let success = result.is_ok();

        if let Ok(mut perf) = ctx.performance.lock() {
            perf.record_metric(format!("{}.duration_ms", name), duration_ms as f64);
            if let Some(mem_mb) = current_memory_mb() {
                let peak = perf.memory_peak_mb.unwrap_or(0);
                if mem_mb > peak {
                    perf.memory_peak_mb = Some(mem_mb);
                }
            }
        }

        debug!(
            "monitored unit '{}' finished in {} ms (success: {})",
            name, duration_ms, success
        );

        if let Some(callback) = &callback {
            callback(&name, duration_ms, success);
        }

        result
    })
}
