//! Panic containment for supervised tasks.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::lifecycle::shutdown::{ShutdownReason, ShutdownTrigger};
use crate::observability::reporter::Reporter;

/// Recovers panics at a task boundary and escalates them to a full shutdown.
///
/// A panic that escapes a supervised component leaves its state unknown, so
/// instead of limping on the barrier reports it and posts
/// [`ShutdownReason::Panic`] to the orchestrator's shutdown trigger.
#[derive(Clone)]
pub struct PanicBarrier {
    trigger: ShutdownTrigger,
    reporter: Arc<dyn Reporter>,
}

impl PanicBarrier {
    pub fn new(trigger: ShutdownTrigger, reporter: Arc<dyn Reporter>) -> Self {
        Self { trigger, reporter }
    }

    /// Drive `fut` to completion, returning `None` if it panicked.
    pub async fn guard<F, T>(&self, task: &str, fut: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(value) => Some(value),
            Err(payload) => {
                self.escalate(task, payload.as_ref());
                None
            }
        }
    }

    /// Synchronous counterpart of [`guard`](Self::guard).
    pub fn guard_blocking<F, T>(&self, task: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> T,
    {
        match std::panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                self.escalate(task, payload.as_ref());
                None
            }
        }
    }

    fn escalate(&self, task: &str, payload: &(dyn Any + Send)) {
        let message = panic_message(payload);
        self.reporter.panic_recovered(task, &message);
        if !self.trigger.trigger(ShutdownReason::Panic { task: task.to_string() }) {
            tracing::debug!(task, "Shutdown already requested");
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
