//! Readiness and probe endpoints.
//!
//! # Data Flow
//! ```text
//! Readiness (readiness.rs):
//!     send_signal → bounded buffer → listener task
//!     → ready flag (NotReady ⇄ Ready)
//!
//! Probes (probes.rs):
//!     GET /readyz → ready flag
//!     GET /status → ready flag + supervisor working flags
//! ```
//!
//! # Design Decisions
//! - The barrier starts NotReady and returns to NotReady on stop
//! - Probes only read state; they never send signals

pub mod probes;
pub mod readiness;

pub use probes::{probe_router, serve_probes, ProbeState};
pub use readiness::{ReadinessBarrier, ReadinessError, ReadinessSignal};
