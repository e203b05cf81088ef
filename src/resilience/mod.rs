//! Resilience helpers for coordination loops.
//!
//! # Data Flow
//! ```text
//! Lease renewal:
//!     jitter.rs  (expiration/3 + random offset up to expiration/10)
//!     → timeouts.rs (every store call bounded by a deadline)
//!     → timeout surfaces as LockError::Timeout, retried next tick
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Jittered renewal keeps processes sharing an expiration out of lockstep
//! - Timeouts are transient errors, never fatal

pub mod jitter;
pub mod timeouts;
