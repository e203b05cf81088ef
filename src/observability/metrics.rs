//! Metrics collection and exposition.
//!
//! # Metrics
//! - `coordinator_leadership_transitions_total` (counter): by election, event
//! - `coordinator_leader` (gauge): 1=leader, 0=follower, by election
//! - `coordinator_store_errors_total` (counter): by election, operation
//! - `coordinator_job_runs_total` (counter): by job
//! - `coordinator_job_failures_total` (counter): by job, kind (failed/panicked)
//! - `coordinator_job_duration_seconds` (histogram): by job
//! - `coordinator_shutdown_hooks_total` (counter)
//! - `coordinator_panics_total` (counter): by task

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::election::LeadershipEvent;
use crate::locker::LockOperation;

/// Install the Prometheus recorder and its scrape listener on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_leadership(election: &str, event: LeadershipEvent) {
    ::metrics::counter!(
        "coordinator_leadership_transitions_total",
        "election" => election.to_string(),
        "event" => event.as_str()
    )
    .increment(1);

    let value = match event {
        LeadershipEvent::Acquired => 1.0,
        LeadershipEvent::Lost => 0.0,
    };
    ::metrics::gauge!("coordinator_leader", "election" => election.to_string()).set(value);
}

pub fn record_store_error(election: &str, operation: LockOperation) {
    ::metrics::counter!(
        "coordinator_store_errors_total",
        "election" => election.to_string(),
        "operation" => operation.as_str()
    )
    .increment(1);
}

pub fn record_job_run(job: &str, elapsed: Duration) {
    ::metrics::counter!("coordinator_job_runs_total", "job" => job.to_string()).increment(1);
    ::metrics::histogram!("coordinator_job_duration_seconds", "job" => job.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_job_failure(job: &str, kind: &'static str) {
    ::metrics::counter!(
        "coordinator_job_failures_total",
        "job" => job.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_shutdown_hook() {
    ::metrics::counter!("coordinator_shutdown_hooks_total").increment(1);
}

pub fn record_panic(task: &str) {
    ::metrics::counter!("coordinator_panics_total", "task" => task.to_string()).increment(1);
}
