//! State transition reporting.

use std::time::Duration;

use crate::election::LeadershipEvent;
use crate::lifecycle::shutdown::Priority;
use crate::locker::{LockError, LockOperation};
use crate::observability::metrics;
use crate::scheduler::ExecutionError;

/// Sink for coordination events.
///
/// Implementations must return quickly and must not panic; every method has
/// a no-op default so sinks only override what they care about.
pub trait Reporter: Send + Sync {
    fn leadership_changed(&self, _election: &str, _event: LeadershipEvent) {}

    fn store_error(&self, _election: &str, _operation: LockOperation, _error: &LockError) {}

    fn job_completed(&self, _job: &str, _elapsed: Duration) {}

    fn job_failed(&self, _error: &ExecutionError, _elapsed: Duration) {}

    fn shutdown_hook_executed(&self, _name: &str, _priority: Priority, _elapsed: Duration) {}

    fn panic_recovered(&self, _task: &str, _message: &str) {}
}

/// Default reporter: structured `tracing` events plus `metrics` updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn leadership_changed(&self, election: &str, event: LeadershipEvent) {
        match event {
            LeadershipEvent::Acquired => tracing::info!(election, "Leadership acquired"),
            LeadershipEvent::Lost => tracing::warn!(election, "Leadership lost"),
        }
        metrics::record_leadership(election, event);
    }

    fn store_error(&self, election: &str, operation: LockOperation, error: &LockError) {
        tracing::warn!(election, %operation, error = %error, "Lock store operation failed");
        metrics::record_store_error(election, operation);
    }

    fn job_completed(&self, job: &str, elapsed: Duration) {
        tracing::debug!(job, elapsed_ms = elapsed.as_millis() as u64, "Job executed");
        metrics::record_job_run(job, elapsed);
    }

    fn job_failed(&self, error: &ExecutionError, elapsed: Duration) {
        tracing::error!(
            job = error.job(),
            kind = error.kind(),
            elapsed_ms = elapsed.as_millis() as u64,
            error = %error,
            "Job execution failed"
        );
        metrics::record_job_run(error.job(), elapsed);
        metrics::record_job_failure(error.job(), error.kind());
    }

    fn shutdown_hook_executed(&self, name: &str, priority: Priority, elapsed: Duration) {
        tracing::info!(
            hook = name,
            priority = priority.0,
            elapsed_ms = elapsed.as_millis() as u64,
            "Shutdown hook executed"
        );
        metrics::record_shutdown_hook();
    }

    fn panic_recovered(&self, task: &str, message: &str) {
        tracing::error!(task, panic = message, "Recovered from panic in supervised task");
        metrics::record_panic(task);
    }
}
