//! Leadership-gated subsystem supervision.
//!
//! # Responsibilities
//! - Bind one election's event stream to a subsystem's start/stop
//! - Keep start/stop idempotent under concurrent triggers
//!
//! # Design Decisions
//! - The working flag is guarded by an async mutex held across start/stop,
//!   so a shutdown racing a leadership event waits instead of interleaving
//! - A lock-free mirror of the flag serves status reads

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::election::LeadershipEvent;

/// Something that can be switched on and off by leadership.
///
/// Both calls must be idempotent: the supervisor never calls `start` twice
/// in a row, but a subsystem shared between supervisors may see it.
#[async_trait]
pub trait Subsystem: Send + Sync {
    async fn start(&self);
    async fn stop(&self);
}

/// Adapter that starts its subsystem on `Acquired` and stops it on `Lost`.
///
/// Created through
/// [`Orchestrator::register_leader_supervisor`](crate::lifecycle::Orchestrator::register_leader_supervisor).
pub struct LeaderSupervisor {
    name: String,
    subsystem: Arc<dyn Subsystem>,
    events: Mutex<Option<mpsc::Receiver<LeadershipEvent>>>,
    working: tokio::sync::Mutex<bool>,
    working_view: AtomicBool,
    cancel: CancellationToken,
}

impl LeaderSupervisor {
    pub(crate) fn new(
        name: String,
        events: mpsc::Receiver<LeadershipEvent>,
        subsystem: Arc<dyn Subsystem>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name,
            subsystem,
            events: Mutex::new(Some(events)),
            working: tokio::sync::Mutex::new(false),
            working_view: AtomicBool::new(false),
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the guarded subsystem is currently started.
    pub fn is_working(&self) -> bool {
        self.working_view.load(Ordering::SeqCst)
    }

    /// Stop reacting to leadership events. Does not stop the subsystem.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn take_events(&self) -> Option<mpsc::Receiver<LeadershipEvent>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// React to one leadership event. Ignored once supervision is cancelled.
    pub(crate) async fn handle(&self, event: LeadershipEvent) {
        let mut working = self.working.lock().await;
        if self.cancel.is_cancelled() {
            tracing::debug!(supervisor = %self.name, %event, "Event after shutdown ignored");
            return;
        }
        match event {
            LeadershipEvent::Acquired if !*working => {
                self.subsystem.start().await;
                self.set_working(&mut working, true);
                tracing::info!(supervisor = %self.name, "Supervisor has started successfully");
            }
            LeadershipEvent::Lost if *working => {
                self.subsystem.stop().await;
                self.set_working(&mut working, false);
                tracing::info!(
                    supervisor = %self.name,
                    "Supervisor has stopped due to lost leadership"
                );
            }
            _ => {
                tracing::debug!(
                    supervisor = %self.name,
                    %event,
                    "Leadership event ignored, already in state"
                );
            }
        }
    }

    /// Cancel supervision and stop the subsystem if it is running.
    pub(crate) async fn shutdown(&self) {
        let mut working = self.working.lock().await;
        self.cancel.cancel();
        if *working {
            self.subsystem.stop().await;
            self.set_working(&mut working, false);
        }
        tracing::info!(supervisor = %self.name, "Supervisor has been stopped");
    }

    /// Event loop run by the orchestrator, one task per supervisor.
    pub(crate) async fn supervise(
        self: Arc<Self>,
        mut events: mpsc::Receiver<LeadershipEvent>,
        root: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = root.cancelled() => {
                    tracing::info!(
                        supervisor = %self.name,
                        "Stopping supervisor due to cancellation"
                    );
                    return;
                }
                _ = self.cancel.cancelled() => {
                    let mut working = self.working.lock().await;
                    self.set_working(&mut working, false);
                    return;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        tracing::info!(supervisor = %self.name, "Supervisor event channel closed");
                        return;
                    }
                },
            }
        }
    }

    fn set_working(&self, working: &mut bool, value: bool) {
        *working = value;
        self.working_view.store(value, Ordering::SeqCst);
    }
}
