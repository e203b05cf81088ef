//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use service_coordinator::lifecycle::Subsystem;
use service_coordinator::scheduler::JobConfig;
use service_coordinator::LeadershipEvent;
use tokio::sync::mpsc;

/// Poll `condition` until it holds, failing the test after `limit`.
pub async fn wait_until(limit: Duration, condition: impl Fn() -> bool) {
    tokio::time::timeout(limit, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Next leadership event, failing the test if none arrives within `limit`.
pub async fn next_event(
    events: &mut mpsc::Receiver<LeadershipEvent>,
    limit: Duration,
) -> Option<LeadershipEvent> {
    tokio::time::timeout(limit, events.recv())
        .await
        .expect("no leadership event in time")
}

/// Subsystem that counts start/stop calls and records their order.
#[derive(Default)]
pub struct RecordingSubsystem {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub log: Mutex<Vec<&'static str>>,
}

impl RecordingSubsystem {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Subsystem for RecordingSubsystem {
    async fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("start");
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push("stop");
    }
}

/// Tracks how many executions are in flight at once.
#[derive(Default)]
pub struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl Concurrency {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Run `work` while counted as in flight.
    pub async fn track<F: Future>(&self, work: F) -> F::Output {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let output = work.await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        output
    }
}

/// A job that sleeps for `work` per execution, counted by `tracker`.
pub fn busy_job(
    name: &str,
    tick: Duration,
    work: Duration,
    tracker: Arc<Concurrency>,
) -> JobConfig {
    JobConfig::new(name, tick, move |_| {
        let tracker = tracker.clone();
        async move {
            tracker
                .track(async {
                    tokio::time::sleep(work).await;
                })
                .await;
            Ok(())
        }
    })
    .deadline(work * 4)
}
