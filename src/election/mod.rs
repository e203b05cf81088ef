//! Leader election subsystem.
//!
//! # Data Flow
//! ```text
//! elect(config)
//!     → fresh holder token (UUID v4)
//!     → immediate acquire attempt
//!     → renewal loop every expiration/3 + jitter:
//!           NotLeader: acquire      → success emits Acquired
//!           Leader:    extend_lease → failure emits Lost
//!     → on cancel while Leader: release, emit final Lost, close channel
//! ```
//!
//! # State Machine
//! ```text
//! NotLeader ⇄ Leader
//!     └──────┴──→ Stopped (terminal, on cancellation)
//! ```
//!
//! # Design Decisions
//! - Store errors count as "not acquired / not renewed"; a failed renewal of
//!   any kind is treated as lost leadership
//! - Events go through a bounded buffer so renewal cadence is decoupled from
//!   a slow consumer
//! - Events alternate strictly: Acquired, Lost, Acquired, ...

pub mod watchdog;

use std::time::Duration;

use thiserror::Error;

pub use watchdog::LeaderWatchdog;

/// Lease duration used when the configuration leaves it at zero.
pub const DEFAULT_LEADER_EXPIRATION: Duration = Duration::from_secs(30);

/// Capacity of each election's event channel; absorbs a few missed ticks
/// from a flapping store before the watchdog has to wait for the consumer.
pub const EVENT_BUFFER: usize = 8;

/// Leadership transition delivered to the election's subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeadershipEvent {
    Acquired,
    Lost,
}

impl LeadershipEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadershipEvent::Acquired => "acquired",
            LeadershipEvent::Lost => "lost",
        }
    }
}

impl std::fmt::Display for LeadershipEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration errors raised by [`LeaderWatchdog::elect`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ElectionError {
    #[error("election name must not be empty")]
    EmptyName,

    #[error("election {0} is already running on this watchdog")]
    AlreadyRunning(String),
}

/// Parameters of a single election.
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Lock key (before namespacing) shared by every contender.
    pub name: String,
    /// Lease duration; zero selects [`DEFAULT_LEADER_EXPIRATION`].
    pub expiration: Duration,
    /// Deadline for each store call; `None` selects `expiration / 3`.
    pub operation_timeout: Option<Duration>,
}

impl ElectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expiration: DEFAULT_LEADER_EXPIRATION,
            operation_timeout: None,
        }
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub(crate) fn effective_expiration(&self) -> Duration {
        if self.expiration.is_zero() {
            DEFAULT_LEADER_EXPIRATION
        } else {
            self.expiration
        }
    }

    pub(crate) fn effective_operation_timeout(&self) -> Duration {
        self.operation_timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or_else(|| self.effective_expiration() / 3)
    }
}
