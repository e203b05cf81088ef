//! Readiness state machine.
//!
//! # States
//! - NotReady: initial, and forced on stop
//! - Ready: set by [`ReadinessSignal::MakeReady`]
//!
//! # State Transitions
//! ```text
//! send_signal → bounded channel (4) → listener task → ready flag
//! ```
//!
//! # Design Decisions
//! - The listener task is the only writer of the flag while running
//! - Reads are a single atomic load, valid even while stopped
//! - Stop drops signals still buffered so a restart begins clean

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the signal buffer.
pub const SIGNAL_BUFFER: usize = 4;

/// Toggle delivered to the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessSignal {
    MakeReady,
    MakeNotReady,
}

impl ReadinessSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessSignal::MakeReady => "ready",
            ReadinessSignal::MakeNotReady => "not_ready",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("readiness barrier {0}: not running")]
    NotRunning(String),

    #[error("readiness barrier {0}: cancelled while sending signal")]
    Cancelled(String),
}

struct Listener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Process readiness flag driven by signals.
pub struct ReadinessBarrier {
    name: String,
    parent: CancellationToken,
    tx: mpsc::Sender<ReadinessSignal>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ReadinessSignal>>>,
    ready: Arc<AtomicBool>,
    running: AtomicBool,
    listener: Mutex<Option<Listener>>,
}

impl ReadinessBarrier {
    /// A stopped, not-ready barrier whose listener derives from `parent`.
    pub fn new(name: impl Into<String>, parent: &CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        Self {
            name: name.into(),
            parent: parent.clone(),
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            ready: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Launch the listener task. No-op while already running.
    pub fn start(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if listener.is_some() {
            return;
        }

        let cancel = self.parent.child_token();
        let handle = tokio::spawn(listen(
            self.name.clone(),
            self.rx.clone(),
            self.ready.clone(),
            cancel.clone(),
        ));
        *listener = Some(Listener { cancel, handle });
        self.running.store(true, Ordering::SeqCst);
        tracing::debug!(barrier = %self.name, "Readiness barrier started");
    }

    /// Stop the listener, drop buffered signals and reset to not ready.
    /// No-op when not running.
    pub async fn stop(&self) {
        let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);

        listener.cancel.cancel();
        if let Err(e) = listener.handle.await {
            tracing::warn!(barrier = %self.name, error = %e, "Readiness listener ended abnormally");
        }

        let mut rx = self.rx.lock().await;
        while rx.try_recv().is_ok() {}
        self.ready.store(false, Ordering::SeqCst);
        tracing::debug!(barrier = %self.name, "Readiness barrier stopped");
    }

    /// Enqueue `signal`, waiting for buffer space unless `cancel` fires first.
    pub async fn send_signal(
        &self,
        signal: ReadinessSignal,
        cancel: &CancellationToken,
    ) -> Result<(), ReadinessError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ReadinessError::NotRunning(self.name.clone()));
        }
        tokio::select! {
            biased;
            sent = self.tx.send(signal) => {
                sent.map_err(|_| ReadinessError::NotRunning(self.name.clone()))
            }
            _ = cancel.cancelled() => Err(ReadinessError::Cancelled(self.name.clone())),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn listen(
    name: String,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ReadinessSignal>>>,
    ready: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let mut rx = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        rx = rx.lock_owned() => rx,
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            signal = rx.recv() => {
                let Some(signal) = signal else { return };
                let value = signal == ReadinessSignal::MakeReady;
                if ready.swap(value, Ordering::SeqCst) != value {
                    tracing::info!(barrier = %name, state = signal.as_str(), "Readiness changed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_ready(barrier: &ReadinessBarrier, expected: bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while barrier.is_ready() != expected {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("readiness did not settle");
    }

    #[tokio::test]
    async fn test_signal_before_start_is_rejected() {
        let barrier = ReadinessBarrier::new("api", &CancellationToken::new());
        let err = barrier
            .send_signal(ReadinessSignal::MakeReady, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ReadinessError::NotRunning("api".into()));
        assert_eq!(err.to_string(), "readiness barrier api: not running");
        assert!(!barrier.is_ready());
    }

    #[tokio::test]
    async fn test_signals_toggle_readiness() {
        let barrier = ReadinessBarrier::new("api", &CancellationToken::new());
        let token = CancellationToken::new();
        barrier.start();
        barrier.start();

        barrier.send_signal(ReadinessSignal::MakeReady, &token).await.unwrap();
        wait_ready(&barrier, true).await;

        barrier.send_signal(ReadinessSignal::MakeNotReady, &token).await.unwrap();
        wait_ready(&barrier, false).await;

        barrier.stop().await;
    }

    #[tokio::test]
    async fn test_stop_resets_and_is_idempotent() {
        let barrier = ReadinessBarrier::new("api", &CancellationToken::new());
        barrier.start();
        barrier
            .send_signal(ReadinessSignal::MakeReady, &CancellationToken::new())
            .await
            .unwrap();
        wait_ready(&barrier, true).await;

        barrier.stop().await;
        barrier.stop().await;
        assert!(!barrier.is_ready());
        assert!(!barrier.is_running());

        barrier.start();
        assert!(!barrier.is_ready());
        barrier.stop().await;
    }

    #[tokio::test]
    async fn test_full_buffer_respects_cancellation() {
        let parent = CancellationToken::new();
        let barrier = ReadinessBarrier::new("api", &parent);
        barrier.start();
        // A cancelled parent stops the listener without stopping the barrier,
        // so nothing drains the buffer.
        parent.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let token = CancellationToken::new();
        for _ in 0..SIGNAL_BUFFER {
            barrier.send_signal(ReadinessSignal::MakeReady, &token).await.unwrap();
        }

        let waiting = tokio::time::timeout(
            Duration::from_millis(20),
            barrier.send_signal(ReadinessSignal::MakeReady, &token),
        )
        .await;
        assert!(waiting.is_err());

        token.cancel();
        let err = barrier
            .send_signal(ReadinessSignal::MakeReady, &token)
            .await
            .unwrap_err();
        assert_eq!(err, ReadinessError::Cancelled("api".into()));

        barrier.stop().await;
        assert!(!barrier.is_ready());
    }
}
