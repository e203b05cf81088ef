//! Shutdown coordination.
//!
//! Two pieces live here: the single shutdown trigger that signal handling
//! and panic escalation post into, and the priority-ordered hook list that
//! the orchestrator drains once shutdown begins.

use std::collections::VecDeque;
use std::future::Future;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

/// Ordering key for shutdown hooks; lower values run earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    pub const IMMEDIATE: Priority = Priority(1);
    pub const CRITICAL: Priority = Priority(20);
    pub const HIGHEST: Priority = Priority(50);
    pub const HIGH: Priority = Priority(100);
    pub const MEDIUM: Priority = Priority(500);
    pub const LOW: Priority = Priority(1000);
    pub const LOWEST: Priority = Priority(10000);
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(value)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why the process is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// An OS termination signal arrived.
    Signal(&'static str),
    /// A supervised task panicked.
    Panic { task: String },
    /// Application code asked for it.
    Requested,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "signal {}", name),
            ShutdownReason::Panic { task } => write!(f, "panic in {}", task),
            ShutdownReason::Requested => f.write_str("requested"),
        }
    }
}

/// Handle for requesting a process shutdown.
///
/// All clones feed the one channel watched by the orchestrator's signal
/// handler, so the first request wins and later ones are absorbed.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: mpsc::Sender<ShutdownReason>,
}

impl ShutdownTrigger {
    /// Create a trigger and the receiving end the shutdown path listens on.
    pub fn channel() -> (Self, mpsc::Receiver<ShutdownReason>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Post a shutdown request without blocking.
    ///
    /// Returns `false` when a request is already pending or the listener is gone.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        self.tx.try_send(reason).is_ok()
    }
}

type HookAction = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A named shutdown action.
pub struct ShutdownHook {
    name: String,
    priority: Priority,
    action: HookAction,
}

impl ShutdownHook {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Consume the hook and run its action.
    pub async fn run(self) {
        (self.action)().await
    }
}

impl std::fmt::Debug for ShutdownHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHook")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Shutdown hooks kept in ascending priority order.
///
/// Hooks sharing a priority keep their registration order.
#[derive(Debug, Default)]
pub struct ShutdownHooks {
    hooks: VecDeque<ShutdownHook>,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<F, Fut>(&mut self, name: impl Into<String>, priority: Priority, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook = ShutdownHook {
            name: name.into(),
            priority,
            action: Box::new(move || -> BoxFuture<'static, ()> { Box::pin(action()) }),
        };
        let at = self.hooks.partition_point(|h| h.priority <= priority);
        self.hooks.insert(at, hook);
    }

    /// Remove the next hook to run.
    pub fn pop_next(&mut self) -> Option<ShutdownHook> {
        self.hooks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name.as_str()).collect()
    }
}
