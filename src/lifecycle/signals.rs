//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGTERM, SIGINT and SIGQUIT
//! - Report which signal arrived so the shutdown reason can be logged
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Non-unix targets fall back to Ctrl+C only

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Registered process termination signals.
pub struct TerminationSignals {
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    interrupt: Signal,
    #[cfg(unix)]
    quit: Signal,
}

impl TerminationSignals {
    /// Register the handlers. Fails if the runtime cannot install them.
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    #[cfg(not(unix))]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next termination signal and return its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        "ctrl-c"
    }
}

/// Wait on `signals` if registered, otherwise never resolve.
pub(crate) async fn next_signal(signals: Option<&mut TerminationSignals>) -> &'static str {
    match signals {
        Some(signals) => signals.recv().await,
        None => std::future::pending().await,
    }
}
