//! Process lifecycle orchestration.
//!
//! # Responsibilities
//! - Own the root cancellation token every component derives from
//! - Bind leader elections to subsystems through [`LeaderSupervisor`]s
//! - Turn OS signals and escaped panics into one shutdown request
//! - Drain shutdown hooks in priority order

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::election::LeadershipEvent;
use crate::lifecycle::shutdown::{Priority, ShutdownHooks, ShutdownReason, ShutdownTrigger};
use crate::lifecycle::signals::{next_signal, TerminationSignals};
use crate::lifecycle::supervisor::{LeaderSupervisor, Subsystem};
use crate::lifecycle::task::PanicBarrier;
use crate::observability::reporter::{Reporter, TracingReporter};

/// Top-level lifecycle owner of a service process.
///
/// Typical use:
/// ```text
/// register hooks and supervisors
/// install_signal_handling()
/// run_supervision()
/// run().await        // until signal, panic or request_shutdown
/// shutdown().await   // stop supervisors, join tasks, drain hooks
/// ```
pub struct Orchestrator {
    root: CancellationToken,
    hooks: Mutex<ShutdownHooks>,
    shutdown_gate: tokio::sync::Mutex<()>,
    supervisors: Mutex<Vec<Arc<LeaderSupervisor>>>,
    tracker: TaskTracker,
    trigger: ShutdownTrigger,
    requests: Mutex<Option<mpsc::Receiver<ShutdownReason>>>,
    barrier: PanicBarrier,
    reporter: Arc<dyn Reporter>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_reporter(Arc::new(TracingReporter))
    }

    pub fn with_reporter(reporter: Arc<dyn Reporter>) -> Self {
        let (trigger, requests) = ShutdownTrigger::channel();
        Self {
            root: CancellationToken::new(),
            hooks: Mutex::new(ShutdownHooks::new()),
            shutdown_gate: tokio::sync::Mutex::new(()),
            supervisors: Mutex::new(Vec::new()),
            tracker: TaskTracker::new(),
            barrier: PanicBarrier::new(trigger.clone(), reporter.clone()),
            trigger,
            requests: Mutex::new(Some(requests)),
            reporter,
        }
    }

    /// Root token; components should derive child tokens from it.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn reporter(&self) -> Arc<dyn Reporter> {
        self.reporter.clone()
    }

    /// Handle for requesting shutdown from anywhere.
    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Barrier for wrapping task bodies not spawned through [`spawn_guarded`](Self::spawn_guarded).
    pub fn panic_barrier(&self) -> PanicBarrier {
        self.barrier.clone()
    }

    /// Ask for an orderly shutdown; handled by the signal-handling task.
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        self.trigger.trigger(reason)
    }

    /// Whether the root token has been cancelled.
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Register a shutdown action; lower priorities run first, ties in
    /// registration order.
    pub fn register_shutdown<F, Fut>(
        &self,
        name: impl Into<String>,
        priority: impl Into<Priority>,
        action: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let priority = priority.into();
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), priority, action);
        tracing::info!(hook = %name, %priority, "Registered shutdown hook");
    }

    /// Names of pending shutdown hooks in execution order.
    pub fn shutdown_hook_names(&self) -> Vec<String> {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Bind an election's event stream to `subsystem`.
    pub fn register_leader_supervisor(
        &self,
        name: impl Into<String>,
        events: mpsc::Receiver<LeadershipEvent>,
        subsystem: Arc<dyn Subsystem>,
    ) -> Arc<LeaderSupervisor> {
        let supervisor = Arc::new(LeaderSupervisor::new(
            name.into(),
            events,
            subsystem,
            self.root.child_token(),
        ));
        self.supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(supervisor.clone());
        supervisor
    }

    pub fn supervisors(&self) -> Vec<Arc<LeaderSupervisor>> {
        self.supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start one event loop per registered supervisor.
    ///
    /// Supervisors already running are skipped, so repeated calls only pick
    /// up newly registered ones.
    pub fn run_supervision(&self) {
        let supervisors = self.supervisors();
        if supervisors.is_empty() {
            tracing::info!("No supervisors registered for leadership");
            return;
        }

        for supervisor in supervisors {
            let Some(events) = supervisor.take_events() else {
                continue;
            };
            let name = format!("supervisor:{}", supervisor.name());
            let root = self.root.clone();
            self.spawn_guarded(name, supervisor.supervise(events, root));
        }
    }

    /// Listen for termination signals and shutdown requests; the first one
    /// cancels the root token. Only the first call has an effect.
    pub fn install_signal_handling(&self) {
        let Some(mut requests) = self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::debug!("Signal handling already installed");
            return;
        };

        let mut signals = match TerminationSignals::register() {
            Ok(signals) => Some(signals),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register OS signal handlers");
                None
            }
        };

        let root = self.root.clone();
        self.spawn_guarded("signal-handler", async move {
            let reason = tokio::select! {
                _ = root.cancelled() => return,
                Some(reason) = requests.recv() => reason,
                name = next_signal(signals.as_mut()) => ShutdownReason::Signal(name),
            };
            tracing::info!(%reason, "Shutdown requested, shutting down application");
            root.cancel();
        });
    }

    /// Spawn `fut` under the orchestrator's task tracker and panic barrier.
    ///
    /// Tracked tasks must finish once the root token is cancelled;
    /// [`shutdown`](Self::shutdown) waits for them.
    pub fn spawn_guarded<F>(&self, name: impl Into<String>, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let barrier = self.barrier.clone();
        let root = self.root.clone();
        self.tracker.spawn(async move {
            if root.is_cancelled() {
                tracing::debug!(task = %name, "Task cancelled before start");
                return;
            }
            barrier.guard(&name, fut).await;
        })
    }

    /// Wait until shutdown has been triggered.
    pub async fn run(&self) {
        self.root.cancelled().await;
    }

    /// Stop supervisors, join orchestrator tasks, then run every shutdown
    /// hook in priority order, one at a time.
    ///
    /// Must not be called from a task spawned through
    /// [`spawn_guarded`](Self::spawn_guarded). Concurrent calls serialize;
    /// later ones find nothing left to do.
    pub async fn shutdown(&self) {
        let _gate = self.shutdown_gate.lock().await;

        for supervisor in self.supervisors() {
            supervisor.shutdown().await;
        }

        tracing::info!("Stopping application");
        self.root.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        loop {
            let next = self
                .hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_next();
            let Some(hook) = next else { break };

            let name = hook.name().to_string();
            let priority = hook.priority();
            let started = Instant::now();
            self.barrier.guard(&name, hook.run()).await;
            self.reporter
                .shutdown_hook_executed(&name, priority, started.elapsed());
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl Subsystem for Counting {
        async fn start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_shutdown_runs_hooks_in_priority_order() {
        let orchestrator = Orchestrator::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for (name, priority) in [("a", 50), ("b", 10), ("c", 200), ("d", 10)] {
            let log = log.clone();
            orchestrator.register_shutdown(name, priority, move || async move {
                log.lock().unwrap().push(name);
            });
        }

        orchestrator.shutdown().await;
        assert_eq!(*log.lock().unwrap(), vec!["b", "d", "a", "c"]);
        assert!(orchestrator.shutdown_hook_names().is_empty());

        orchestrator.shutdown().await;
        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_hooks_run_sequentially() {
        let orchestrator = Orchestrator::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        for i in 0..4 {
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            let hook = move || async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            };
            orchestrator.register_shutdown(format!("hook-{i}"), Priority::MEDIUM, hook);
        }

        orchestrator.shutdown().await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_hook_does_not_abort_shutdown() {
        let orchestrator = Orchestrator::new();
        let ran = Arc::new(AtomicUsize::new(0));

        orchestrator.register_shutdown("explodes", Priority::IMMEDIATE, || async {
            panic!("hook failure");
        });
        let counter = ran.clone();
        orchestrator.register_shutdown("after", Priority::LOWEST, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        orchestrator.shutdown().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_supervision_and_shutdown_stop_subsystem() {
        let orchestrator = Orchestrator::new();
        let subsystem = Arc::new(Counting::default());
        let (tx, rx) = mpsc::channel(8);
        let supervisor = orchestrator.register_leader_supervisor("jobs", rx, subsystem.clone());

        orchestrator.run_supervision();
        orchestrator.run_supervision();

        tx.send(LeadershipEvent::Acquired).await.unwrap();
        wait_for(|| supervisor.is_working()).await;
        assert_eq!(subsystem.starts.load(Ordering::SeqCst), 1);

        orchestrator.shutdown().await;
        assert!(!supervisor.is_working());
        assert_eq!(subsystem.stops.load(Ordering::SeqCst), 1);
        assert!(orchestrator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_panic_in_guarded_task_triggers_shutdown() {
        let orchestrator = Orchestrator::new();
        orchestrator.install_signal_handling();

        orchestrator.spawn_guarded("faulty", async {
            panic!("supervised failure");
        });

        tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
            .await
            .expect("panic did not escalate to shutdown");
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_shutdown_cancels_root() {
        let orchestrator = Orchestrator::new();
        orchestrator.install_signal_handling();
        orchestrator.install_signal_handling();

        assert!(orchestrator.request_shutdown(ShutdownReason::Requested));
        tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
            .await
            .expect("request did not cancel root");
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_shutdowns_run_hooks_once() {
        let orchestrator = Arc::new(Orchestrator::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        orchestrator.register_shutdown("once", Priority::HIGH, move || async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.shutdown().await }
        });
        let second = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.shutdown().await }
        });
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
