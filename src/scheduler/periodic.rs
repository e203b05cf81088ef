//! Fixed-tick job scheduler.
//!
//! # Responsibilities
//! - Hold the job registry, closed for changes while running
//! - Run one ticking task per job, every execution gated by the shared
//!   [`RateLimiter`]
//! - Contain job failures and panics; a broken job keeps ticking
//!
//! # Data Flow
//! ```text
//! start() → per-job child token → worker task
//!     tick → limiter permit → execution token (stop mode) → job future
//!          → deadline cancels token → reporter
//! stop()  → cancel job tokens → join workers
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::lifecycle::supervisor::Subsystem;
use crate::lifecycle::task::panic_message;
use crate::observability::reporter::{Reporter, TracingReporter};
use crate::scheduler::job::{
    ExecutionError, JobConfig, JobContext, JobFn, SchedulerError, StopMode,
};
use crate::scheduler::limiter::RateLimiter;

struct Job {
    name: Arc<str>,
    tick: Duration,
    deadline: Duration,
    stop_mode: StopMode,
    func: JobFn,
}

struct Running {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

#[derive(Default)]
struct State {
    jobs: Vec<Arc<Job>>,
    running: Option<Running>,
}

/// Runs a fixed set of named periodic jobs.
///
/// Jobs are registered with [`add`](Self::add) while the scheduler is
/// stopped. Executions of one job never overlap: a tick that fires while the
/// previous execution is still running is dropped, not queued.
pub struct JobScheduler {
    state: Mutex<State>,
    limiter: RateLimiter,
    parent: CancellationToken,
    reporter: Arc<dyn Reporter>,
}

impl JobScheduler {
    /// A scheduler allowing `rate` concurrent executions across its jobs.
    pub fn new(rate: usize) -> Self {
        Self::with_limiter(RateLimiter::new(rate))
    }

    /// A scheduler sharing `limiter` with other schedulers.
    pub fn with_limiter(limiter: RateLimiter) -> Self {
        Self {
            state: Mutex::new(State::default()),
            limiter,
            parent: CancellationToken::new(),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Derive job tokens from `parent`, so cancelling it stops every job.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.parent = parent.clone();
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Register a job. Rejected once started, for a taken name, or for a
    /// zero tick or deadline.
    pub fn add(&self, config: JobConfig) -> Result<(), SchedulerError> {
        if config.tick.is_zero() {
            return Err(SchedulerError::InvalidJob {
                name: config.name,
                reason: "tick must be positive",
            });
        }
        let deadline = config.effective_deadline();
        if deadline.is_zero() {
            return Err(SchedulerError::InvalidJob {
                name: config.name,
                reason: "deadline must be positive",
            });
        }

        let mut state = self.lock_state();
        if state.running.is_some() {
            return Err(SchedulerError::AlreadyStarted(config.name));
        }
        if state.jobs.iter().any(|job| *job.name == *config.name) {
            return Err(SchedulerError::DuplicateJob(config.name));
        }

        tracing::debug!(
            job = %config.name,
            tick_ms = config.tick.as_millis() as u64,
            "Job registered"
        );
        state.jobs.push(Arc::new(Job {
            name: Arc::from(config.name),
            tick: config.tick,
            deadline,
            stop_mode: config.stop_mode,
            func: config.func,
        }));
        Ok(())
    }

    /// Launch one worker per job. A second call while running is a no-op.
    pub fn start(&self) {
        let mut state = self.lock_state();
        if state.running.is_some() {
            tracing::warn!("Scheduler already started");
            return;
        }

        let cancel = self.parent.child_token();
        let tracker = TaskTracker::new();
        for job in &state.jobs {
            let worker = JobWorker {
                job: job.clone(),
                token: cancel.child_token(),
                limiter: self.limiter.clone(),
                reporter: self.reporter.clone(),
            };
            tracker.spawn(worker.run());
        }
        tracker.close();

        tracing::info!(jobs = state.jobs.len(), "Scheduler started");
        state.running = Some(Running { cancel, tracker });
    }

    /// Cancel every job and wait for all workers to exit. No-op when not
    /// started.
    pub async fn stop(&self) {
        let Some(running) = self.lock_state().running.take() else {
            return;
        };
        running.cancel.cancel();
        running.tracker.wait().await;
        tracing::info!("Scheduler stopped");
    }

    pub fn is_started(&self) -> bool {
        self.lock_state().running.is_some()
    }

    /// Registered job names in registration order.
    pub fn job_names(&self) -> Vec<String> {
        self.lock_state()
            .jobs
            .iter()
            .map(|job| job.name.to_string())
            .collect()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Subsystem for JobScheduler {
    async fn start(&self) {
        JobScheduler::start(self);
    }

    async fn stop(&self) {
        JobScheduler::stop(self).await;
    }
}

struct JobWorker {
    job: Arc<Job>,
    token: CancellationToken,
    limiter: RateLimiter,
    reporter: Arc<dyn Reporter>,
}

impl JobWorker {
    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.job.tick, self.job.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    tracing::info!(job = %self.job.name, "Job stopped");
                    return;
                }
                _ = ticker.tick() => self.exec().await,
            }
        }
    }

    async fn exec(&self) {
        let Some(_permit) = self.limiter.acquire(&self.token).await else {
            return;
        };
        if self.token.is_cancelled() {
            return;
        }

        let exec_token = match self.job.stop_mode {
            StopMode::Immediate => self.token.child_token(),
            StopMode::Graceful => CancellationToken::new(),
        };
        let started = Instant::now();
        let deadline = started + self.job.deadline;
        let ctx = JobContext::new(self.job.name.clone(), exec_token.clone(), deadline);

        let func = &self.job.func;
        // The closure itself may panic before returning its future.
        let run = AssertUnwindSafe(async move { func(ctx).await }).catch_unwind();
        tokio::pin!(run);
        let outcome = tokio::select! {
            outcome = &mut run => outcome,
            _ = tokio::time::sleep_until(deadline) => {
                tracing::debug!(job = %self.job.name, "Job deadline reached");
                exec_token.cancel();
                run.await
            }
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(())) => self.reporter.job_completed(&self.job.name, elapsed),
            Ok(Err(error)) if self.token.is_cancelled() && exec_token.is_cancelled() => {
                tracing::debug!(
                    job = %self.job.name,
                    error = %error,
                    "Job interrupted by scheduler stop"
                );
            }
            Ok(Err(source)) => {
                let error = ExecutionError::Failed {
                    job: self.job.name.to_string(),
                    source,
                };
                self.reporter.job_failed(&error, elapsed);
            }
            Err(payload) => {
                let error = ExecutionError::Panicked {
                    job: self.job.name.to_string(),
                    message: panic_message(payload.as_ref()),
                };
                self.reporter.job_failed(&error, elapsed);
            }
        }
    }
}
