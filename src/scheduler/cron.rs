//! Calendar job scheduler.
//!
//! # Responsibilities
//! - Run named jobs on six-field cron expressions (seconds first)
//! - Reject malformed expressions when the job is added
//! - Report failures and panics; a broken job keeps firing
//!
//! # Data Flow
//! ```text
//! start() → per-entry worker
//!     next fire (UTC) → sleep → execution token → job future
//!          → next fire passes: token cancelled → reporter
//! stop()  → cancel workers → join
//! ```
//!
//! # Design Decisions
//! - Wall time is anchored once at start and advanced on tokio's clock, so
//!   fire times follow the runtime timer
//! - A fire that passes while the previous execution runs is skipped
//! - Every execution must finish before the next fire; its context is
//!   cancelled at that instant

use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cron::Schedule;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::lifecycle::supervisor::Subsystem;
use crate::lifecycle::task::panic_message;
use crate::observability::reporter::{Reporter, TracingReporter};
use crate::scheduler::job::{ExecutionError, JobContext, JobFn, JobResult, SchedulerError};

struct CronEntry {
    name: Arc<str>,
    expression: String,
    schedule: Schedule,
    func: JobFn,
}

struct Running {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

#[derive(Default)]
struct State {
    entries: Vec<Arc<CronEntry>>,
    running: Option<Running>,
}

/// Runs named jobs on cron calendars.
///
/// Expressions carry a leading seconds field, e.g. `*/10 * * * * *` fires
/// every ten seconds. Times are evaluated in UTC.
pub struct CronScheduler {
    state: Mutex<State>,
    parent: CancellationToken,
    reporter: Arc<dyn Reporter>,
}

impl Default for CronScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CronScheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            parent: CancellationToken::new(),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Derive worker tokens from `parent`, so cancelling it stops every job.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.parent = parent.clone();
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Register `func` to run on `expression`.
    ///
    /// Rejected once started, for a taken name, or for an expression that
    /// does not parse.
    pub fn add<F, Fut>(
        &self,
        name: impl Into<String>,
        expression: &str,
        func: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = JobResult> + Send + 'static,
    {
        let name = name.into();
        let schedule = parse_schedule(expression).map_err(|reason| {
            SchedulerError::InvalidSchedule {
                name: name.clone(),
                expression: expression.to_string(),
                reason,
            }
        })?;

        let mut state = self.lock_state();
        if state.running.is_some() {
            return Err(SchedulerError::AlreadyStarted(name));
        }
        if state.entries.iter().any(|entry| *entry.name == *name) {
            return Err(SchedulerError::DuplicateJob(name));
        }

        tracing::debug!(job = %name, expression, "Cron job registered");
        state.entries.push(Arc::new(CronEntry {
            name: Arc::from(name),
            expression: expression.to_string(),
            schedule,
            func: Arc::new(move |ctx| -> BoxFuture<'static, JobResult> {
                Box::pin(func(ctx))
            }),
        }));
        Ok(())
    }

    /// Launch one worker per entry. A second call while running is a no-op.
    pub fn start(&self) {
        let mut state = self.lock_state();
        if state.running.is_some() {
            tracing::warn!("Cron scheduler already started");
            return;
        }

        let cancel = self.parent.child_token();
        let tracker = TaskTracker::new();
        let clock = Clock::now();
        for entry in &state.entries {
            let worker = CronWorker {
                entry: entry.clone(),
                token: cancel.child_token(),
                clock,
                reporter: self.reporter.clone(),
            };
            tracker.spawn(worker.run());
        }
        tracker.close();

        tracing::info!(jobs = state.entries.len(), "Cron scheduler started");
        state.running = Some(Running { cancel, tracker });
    }

    /// Cancel every job and wait for the workers to exit. No-op when not
    /// started.
    pub async fn stop(&self) {
        let Some(running) = self.lock_state().running.take() else {
            return;
        };
        running.cancel.cancel();
        running.tracker.wait().await;
        tracing::info!("Cron scheduler stopped");
    }

    pub fn is_started(&self) -> bool {
        self.lock_state().running.is_some()
    }

    /// Registered `(name, expression)` pairs in registration order.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.lock_state()
            .entries
            .iter()
            .map(|entry| (entry.name.to_string(), entry.expression.clone()))
            .collect()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Subsystem for CronScheduler {
    async fn start(&self) {
        CronScheduler::start(self);
    }

    async fn stop(&self) {
        CronScheduler::stop(self).await;
    }
}

/// Parse a six or seven field cron expression.
pub fn parse_schedule(expression: &str) -> Result<Schedule, String> {
    Schedule::from_str(expression.trim()).map_err(|e| e.to_string())
}

/// UTC wall time driven by the tokio clock.
#[derive(Clone, Copy)]
struct Clock {
    wall: DateTime<Utc>,
    instant: Instant,
}

impl Clock {
    fn now() -> Self {
        Self {
            wall: Utc::now(),
            instant: Instant::now(),
        }
    }

    fn wall_at(&self, instant: Instant) -> DateTime<Utc> {
        let offset = instant.saturating_duration_since(self.instant);
        chrono::Duration::from_std(offset)
            .ok()
            .and_then(|offset| self.wall.checked_add_signed(offset))
            .unwrap_or(self.wall)
    }

    fn instant_at(&self, wall: DateTime<Utc>) -> Instant {
        let offset = (wall - self.wall).to_std().unwrap_or(Duration::ZERO);
        self.instant + offset
    }

    /// The first fire of `schedule` strictly after `instant`.
    fn next_fire(&self, schedule: &Schedule, instant: Instant) -> Option<Instant> {
        schedule
            .after(&self.wall_at(instant))
            .next()
            .map(|wall| self.instant_at(wall))
    }
}

struct CronWorker {
    entry: Arc<CronEntry>,
    token: CancellationToken,
    clock: Clock,
    reporter: Arc<dyn Reporter>,
}

impl CronWorker {
    async fn run(self) {
        let mut next = self.clock.next_fire(&self.entry.schedule, Instant::now());

        while let Some(fire) = next {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep_until(fire) => {}
            }
            let deadline = self.clock.next_fire(&self.entry.schedule, fire);
            self.exec(deadline).await;
            next = self.clock.next_fire(&self.entry.schedule, Instant::now());
        }

        if next.is_none() {
            tracing::info!(job = %self.entry.name, "Cron schedule exhausted");
        }
        tracing::info!(job = %self.entry.name, "Cron job stopped");
    }

    async fn exec(&self, deadline: Option<Instant>) {
        if self.token.is_cancelled() {
            return;
        }

        let exec_token = self.token.child_token();
        let started = Instant::now();
        let horizon = deadline.unwrap_or_else(|| started + Duration::from_secs(86_400 * 365));
        let ctx = JobContext::new(self.entry.name.clone(), exec_token.clone(), horizon);

        let func = &self.entry.func;
        let run = AssertUnwindSafe(async move { func(ctx).await }).catch_unwind();
        tokio::pin!(run);
        let outcome = tokio::select! {
            outcome = &mut run => outcome,
            _ = tokio::time::sleep_until(horizon) => {
                tracing::debug!(job = %self.entry.name, "Cron job overran its next fire");
                exec_token.cancel();
                run.await
            }
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(())) => self.reporter.job_completed(&self.entry.name, elapsed),
            Ok(Err(error)) if self.token.is_cancelled() => {
                tracing::debug!(
                    job = %self.entry.name,
                    error = %error,
                    "Cron job interrupted by scheduler stop"
                );
            }
            Ok(Err(source)) => {
                let error = ExecutionError::Failed {
                    job: self.entry.name.to_string(),
                    source,
                };
                self.reporter.job_failed(&error, elapsed);
            }
            Err(payload) => {
                let error = ExecutionError::Panicked {
                    job: self.entry.name.to_string(),
                    message: panic_message(payload.as_ref()),
                };
                self.reporter.job_failed(&error, elapsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Failures {
        failed: AtomicUsize,
        panicked: AtomicUsize,
    }

    impl Reporter for Failures {
        fn job_failed(&self, error: &ExecutionError, _elapsed: Duration) {
            match error {
                ExecutionError::Failed { .. } => self.failed.fetch_add(1, Ordering::SeqCst),
                ExecutionError::Panicked { .. } => self.panicked.fetch_add(1, Ordering::SeqCst),
            };
        }
    }

    type Counting = futures_util::future::Ready<JobResult>;

    fn counting(
        runs: &Arc<AtomicUsize>,
    ) -> impl Fn(JobContext) -> Counting + Send + Sync + 'static {
        let runs = runs.clone();
        move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            futures_util::future::ready(Ok(()))
        }
    }

    #[test]
    fn test_add_rejects_invalid_expressions() {
        let cron = CronScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for expression in ["", "* * * * *", "61 * * * * *", "every minute"] {
            let err = cron.add("bad", expression, counting(&runs)).unwrap_err();
            assert!(
                matches!(err, SchedulerError::InvalidSchedule { .. }),
                "{expression:?} accepted"
            );
        }
        assert!(cron.entries().is_empty());

        cron.add("report", "0 0 8 * * *", counting(&runs)).unwrap();
        assert_eq!(
            cron.add("report", "*/5 * * * * *", counting(&runs)),
            Err(SchedulerError::DuplicateJob("report".into()))
        );
        assert_eq!(
            cron.entries(),
            vec![("report".to_string(), "0 0 8 * * *".to_string())]
        );
    }

    #[tokio::test]
    async fn test_add_rejected_while_running() {
        let cron = CronScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        cron.start();
        assert_eq!(
            cron.add("late", "* * * * * *", counting(&runs)),
            Err(SchedulerError::AlreadyStarted("late".into()))
        );
        cron.stop().await;
        cron.add("late", "* * * * * *", counting(&runs)).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_on_schedule() {
        let cron = CronScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        cron.add("every-second", "* * * * * *", counting(&runs)).unwrap();

        cron.start();
        cron.start();
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        cron.stop().await;
        cron.stop().await;

        let seen = runs.load(Ordering::SeqCst);
        assert!((5..=6).contains(&seen), "fired {seen} times");
        assert!(!cron.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_and_panics_reported_and_keep_firing() {
        let reporter = Arc::new(Failures::default());
        let cron = CronScheduler::new().with_reporter(reporter.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        cron.add("flaky", "* * * * * *", move |_| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            if call % 2 == 0 {
                panic!("cron job closure failed");
            }
            async { JobResult::Err("export failed".into()) }
        })
        .unwrap();

        cron.start();
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        cron.stop().await;

        assert!(calls.load(Ordering::SeqCst) >= 4);
        assert!(reporter.panicked.load(Ordering::SeqCst) >= 2);
        assert!(reporter.failed.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_in_flight_execution() {
        let cron = CronScheduler::new();
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        cron.add("long", "0 * * * * *", move |ctx| {
            let flag = flag.clone();
            async move {
                ctx.cancelled().await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

        cron.start();
        tokio::time::sleep(Duration::from_secs(61)).await;
        let stopping = Instant::now();
        cron.stop().await;

        assert!(interrupted.load(Ordering::SeqCst));
        assert!(stopping.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_firing() {
        let parent = CancellationToken::new();
        let cron = CronScheduler::new().with_parent(&parent);
        let runs = Arc::new(AtomicUsize::new(0));
        cron.add("tick", "* * * * * *", counting(&runs)).unwrap();

        cron.start();
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        parent.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let seen = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(runs.load(Ordering::SeqCst), seen);
        cron.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cron_as_subsystem() {
        let cron: Arc<dyn Subsystem> = Arc::new(CronScheduler::new());
        cron.start().await;
        cron.stop().await;
    }
}
