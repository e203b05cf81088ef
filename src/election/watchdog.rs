//! Lease-based leader election watchdog.
//!
//! # Responsibilities
//! - Run one renewal loop per election on top of a [`Locker`]
//! - Publish leadership transitions on a bounded channel
//! - Release held leases when cancelled
//! - Free the election name even if a session panics

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::election::{ElectionConfig, ElectionError, LeadershipEvent, EVENT_BUFFER};
use crate::lifecycle::task::PanicBarrier;
use crate::locker::{LockOperation, Locker};
use crate::observability::reporter::{Reporter, TracingReporter};
use crate::resilience::jitter::renewal_interval;
use crate::resilience::timeouts::with_deadline;

/// Runs elections against a shared lock store.
///
/// Every election started through [`elect`](Self::elect) is tied to the
/// watchdog's cancellation token; [`stop`](Self::stop) ends all of them.
pub struct LeaderWatchdog {
    locker: Arc<dyn Locker>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    elections: Arc<DashMap<String, Arc<AtomicBool>>>,
    reporter: Arc<dyn Reporter>,
    barrier: Option<PanicBarrier>,
}

impl LeaderWatchdog {
    /// Create a watchdog whose elections end when `parent` is cancelled.
    pub fn new(locker: Arc<dyn Locker>, parent: &CancellationToken) -> Self {
        Self {
            locker,
            cancel: parent.child_token(),
            tracker: TaskTracker::new(),
            elections: Arc::new(DashMap::new()),
            reporter: Arc::new(TracingReporter),
            barrier: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Escalate a panicking election session through `barrier`.
    pub fn with_panic_barrier(mut self, barrier: PanicBarrier) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// Start contending for `config.name` and return the event stream.
    ///
    /// Fails before touching the store if the name is empty or already
    /// contended by this watchdog. The channel closes once the election ends.
    pub fn elect(
        &self,
        config: ElectionConfig,
    ) -> Result<mpsc::Receiver<LeadershipEvent>, ElectionError> {
        if config.name.is_empty() {
            return Err(ElectionError::EmptyName);
        }

        let leader = Arc::new(AtomicBool::new(false));
        match self.elections.entry(config.name.clone()) {
            Entry::Occupied(_) => return Err(ElectionError::AlreadyRunning(config.name)),
            Entry::Vacant(entry) => {
                entry.insert(leader.clone());
            }
        }

        let (events, receiver) = mpsc::channel(EVENT_BUFFER);
        let session = ElectionSession {
            name: config.name.clone(),
            token: Uuid::new_v4().to_string(),
            expiration: config.effective_expiration(),
            operation_timeout: config.effective_operation_timeout(),
            locker: self.locker.clone(),
            reporter: self.reporter.clone(),
            cancel: self.cancel.clone(),
            events,
            leader,
            announced: false,
        };

        let entry = RegisteredElection {
            elections: self.elections.clone(),
            name: config.name,
        };
        let barrier = self.barrier.clone();
        self.tracker.spawn(async move {
            match barrier {
                Some(barrier) => {
                    let task = format!("election:{}", entry.name);
                    barrier.guard(&task, session.run()).await;
                }
                None => session.run().await,
            }
            drop(entry);
        });

        Ok(receiver)
    }

    /// Whether this process currently holds the lease for `name`.
    pub fn is_leader(&self, name: &str) -> bool {
        self.elections
            .get(name)
            .map(|leader| leader.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Cancel every election and wait until each has released its lease
    /// and closed its channel.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::debug!("Leader watchdog stopped");
    }
}

/// Removes the election from the registry when dropped, unwinding included.
struct RegisteredElection {
    elections: Arc<DashMap<String, Arc<AtomicBool>>>,
    name: String,
}

impl Drop for RegisteredElection {
    fn drop(&mut self) {
        self.elections.remove(&self.name);
    }
}

struct ElectionSession {
    name: String,
    token: String,
    expiration: Duration,
    operation_timeout: Duration,
    locker: Arc<dyn Locker>,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
    events: mpsc::Sender<LeadershipEvent>,
    leader: Arc<AtomicBool>,
    /// Whether the last event the subscriber received was `Acquired`.
    announced: bool,
}

impl ElectionSession {
    async fn run(mut self) {
        if self.cancel.is_cancelled() {
            return;
        }

        let period = renewal_interval(self.expiration);
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            election = %self.name,
            expiration_ms = self.expiration.as_millis() as u64,
            renew_every_ms = period.as_millis() as u64,
            "Election started"
        );

        if self.try_acquire().await {
            self.transition(LeadershipEvent::Acquired).await;
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !self.is_leader() {
                        if self.try_acquire().await {
                            self.transition(LeadershipEvent::Acquired).await;
                        }
                    } else if !self.try_extend().await {
                        self.transition(LeadershipEvent::Lost).await;
                    }
                }
            }
        }

        if self.is_leader() {
            self.release().await;
            self.leader.store(false, Ordering::SeqCst);
            self.reporter.leadership_changed(&self.name, LeadershipEvent::Lost);
            if self.announced && self.events.try_send(LeadershipEvent::Lost).is_err() {
                tracing::warn!(election = %self.name, "Final leadership loss not delivered");
            }
        }

        tracing::info!(election = %self.name, "Election stopped");
    }

    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    async fn transition(&mut self, event: LeadershipEvent) {
        self.leader
            .store(event == LeadershipEvent::Acquired, Ordering::SeqCst);
        self.reporter.leadership_changed(&self.name, event);

        tokio::select! {
            biased;
            sent = self.events.send(event) => {
                if sent.is_err() {
                    tracing::debug!(election = %self.name, %event, "Leadership subscriber gone");
                }
                self.announced = event == LeadershipEvent::Acquired;
            }
            _ = self.cancel.cancelled() => {
                tracing::warn!(
                    election = %self.name,
                    %event,
                    "Leadership event dropped during cancellation"
                );
            }
        }
    }

    async fn try_acquire(&self) -> bool {
        let attempt = self.locker.acquire(&self.name, &self.token, self.expiration);
        match with_deadline(self.operation_timeout, attempt).await {
            Ok(acquired) => acquired,
            Err(e) => {
                self.reporter.store_error(&self.name, LockOperation::Acquire, &e);
                false
            }
        }
    }

    async fn try_extend(&self) -> bool {
        let attempt = self.locker.extend_lease(&self.name, &self.token, self.expiration);
        match with_deadline(self.operation_timeout, attempt).await {
            Ok(extended) => extended,
            Err(e) => {
                self.reporter.store_error(&self.name, LockOperation::ExtendLease, &e);
                false
            }
        }
    }

    async fn release(&self) {
        let attempt = self.locker.release(&self.name, &self.token);
        match with_deadline(self.operation_timeout, attempt).await {
            Ok(true) => tracing::debug!(election = %self.name, "Lease released"),
            Ok(false) => tracing::debug!(election = %self.name, "Lease already gone at release"),
            Err(e) => self.reporter.store_error(&self.name, LockOperation::Release, &e),
        }
    }
}
