//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Coordination components (watchdog, scheduler, orchestrator):
//!     → reporter.rs (injected Reporter, one call per state transition)
//!         → structured tracing events
//!         → metrics.rs counters, gauges, histograms
//!
//! Binary startup:
//!     → logging.rs (tracing-subscriber, env filter, text or JSON)
//!     → metrics.rs (Prometheus scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - The reporter is passed in, never a process-wide singleton
//! - Reporting calls never block and never fail the caller
//! - Metric updates are atomic increments behind the `metrics` facade

pub mod logging;
pub mod metrics;
pub mod reporter;

pub use reporter::{Reporter, TracingReporter};
