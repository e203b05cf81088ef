//! Job definitions and the per-execution context.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Error type returned by job functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of one job execution.
pub type JobResult = Result<(), BoxError>;

pub(crate) type JobFn = Arc<dyn Fn(JobContext) -> BoxFuture<'static, JobResult> + Send + Sync>;

/// What happens to an in-flight execution when the scheduler stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopMode {
    /// The execution context is cancelled together with the job.
    #[default]
    Immediate,
    /// The execution runs on, bounded only by its deadline.
    Graceful,
}

/// Registration of a named periodic task.
#[derive(Clone)]
pub struct JobConfig {
    pub(crate) name: String,
    pub(crate) tick: Duration,
    pub(crate) deadline: Option<Duration>,
    pub(crate) stop_mode: StopMode,
    pub(crate) func: JobFn,
}

impl JobConfig {
    /// A job running `func` every `tick`, deadline equal to the tick,
    /// [`StopMode::Immediate`].
    pub fn new<F, Fut>(name: impl Into<String>, tick: Duration, func: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            tick,
            deadline: None,
            stop_mode: StopMode::default(),
            func: Arc::new(move |ctx| -> BoxFuture<'static, JobResult> { Box::pin(func(ctx)) }),
        }
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn stop_mode(mut self, stop_mode: StopMode) -> Self {
        self.stop_mode = stop_mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn effective_deadline(&self) -> Duration {
        self.deadline.unwrap_or(self.tick)
    }
}

impl std::fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobConfig")
            .field("name", &self.name)
            .field("tick", &self.tick)
            .field("deadline", &self.deadline)
            .field("stop_mode", &self.stop_mode)
            .finish_non_exhaustive()
    }
}

/// Context handed to every job execution.
///
/// Cancelled when the execution deadline passes and, for
/// [`StopMode::Immediate`] jobs, when the scheduler stops.
#[derive(Debug, Clone)]
pub struct JobContext {
    job: Arc<str>,
    token: CancellationToken,
    deadline: Instant,
}

impl JobContext {
    pub(crate) fn new(job: Arc<str>, token: CancellationToken, deadline: Instant) -> Self {
        Self { job, token, deadline }
    }

    pub fn job_name(&self) -> &str {
        &self.job
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the execution should wind down.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Registration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler.add({0}): already started")]
    AlreadyStarted(String),

    #[error("scheduler.add({0}): job already exists")]
    DuplicateJob(String),

    #[error("scheduler.add({name}): {reason}")]
    InvalidJob { name: String, reason: &'static str },

    #[error("scheduler.add({name}): invalid schedule {expression:?}: {reason}")]
    InvalidSchedule {
        name: String,
        expression: String,
        reason: String,
    },
}

/// A job execution that did not succeed.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("job {job} failed: {source}")]
    Failed {
        job: String,
        #[source]
        source: BoxError,
    },

    #[error("panic in job {job}: {message}")]
    Panicked { job: String, message: String },
}

impl ExecutionError {
    pub fn job(&self) -> &str {
        match self {
            ExecutionError::Failed { job, .. } | ExecutionError::Panicked { job, .. } => job,
        }
    }

    /// Metric label for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::Failed { .. } => "failed",
            ExecutionError::Panicked { .. } => "panicked",
        }
    }
}
