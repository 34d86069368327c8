//! Timeout Enhancer
//!
//! Races a unit against a wall-clock timer by running it on a worker
//! thread and waiting on a channel with a deadline. On expiry the call
//! returns a retryable timeout error; the worker is not killed, its
//! eventual result is simply discarded.

use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::warn;

use crate::error::WorkflowError;

use super::ExecutableUnit;

/// Wraps a unit with a wall-clock timeout.
///
/// When nested outside a retry enhancer, the timeout bounds the entire
/// retry sequence rather than a single attempt.
pub fn with_timeout(unit: ExecutableUnit, timeout: Duration) -> ExecutableUnit {
    Arc::new(move |ctx| {
        let (tx, rx) = channel();
        let inner = Arc::clone(&unit);
        let worker_ctx = Arc::clone(&ctx);

        thread::spawn(move || {
            // The receiver may be gone if the timer already expired.
            let _ = tx.send(inner(worker_ctx));
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let timeout_ms = timeout.as_millis() as u64;
                warn!(
                    "step '{}' timed out after {} ms; abandoning the in-flight call",
                    ctx.step_id, timeout_ms
                );
                Err(WorkflowError::timeout(&ctx.step_id, timeout_ms))
            }
            Err(RecvTimeoutError::Disconnected) => Err(WorkflowError::execution(
                &ctx.step_id,
                "execution worker terminated without a result",
            )),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::ExecutionContext;
    use crate::resilience::unit;
    use serde_json::{json, Value};
    use std::time::Instant;

    fn ctx() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new("slow", "wf", Value::Null))
    }

    #[test]
    fn test_fast_unit_passes_through() {
        let wrapped = with_timeout(unit(|_| Ok(json!("done"))), Duration::from_secs(1));
        assert_eq!(wrapped(ctx()).unwrap(), json!("done"));
    }

    #[test]
    fn test_slow_unit_times_out() {
        let wrapped = with_timeout(
            unit(|_| {
                thread::sleep(Duration::from_millis(500));
                Ok(json!("too late"))
            }),
            Duration::from_millis(50),
        );

        let start = Instant::now();
        let err = wrapped(ctx()).unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(err.code(), "STEP_TIMEOUT_ERROR");
        assert!(err.is_retryable());
        // Returned near the deadline, not after the unit finished
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[test]
    fn test_timeout_error_carries_deadline() {
        let wrapped = with_timeout(
            unit(|_| {
                thread::sleep(Duration::from_millis(200));
                Ok(Value::Null)
            }),
            Duration::from_millis(40),
        );

        match wrapped(ctx()).unwrap_err() {
            WorkflowError::Timeout {
                step_id,
                timeout_ms,
            } => {
                assert_eq!(step_id, "slow");
                assert_eq!(timeout_ms, 40);
            }
            other => panic!("expected timeout error, got {:?}", other),
        }
    }

    #[test]
    fn test_inner_error_propagates() {
        let wrapped = with_timeout(
            unit(|ctx| Err(WorkflowError::execution(&ctx.step_id, "broken"))),
            Duration::from_secs(1),
        );
        let err = wrapped(ctx()).unwrap_err();
        assert_eq!(err.code(), "STEP_EXECUTION_ERROR");
    }
}
