//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Lock store → Readiness → Scheduler → Election → Supervisor
//!
//! Supervision (supervisor.rs):
//!     LeadershipEvent::Acquired → Subsystem::start
//!     LeadershipEvent::Lost     → Subsystem::stop
//!
//! Signals (signals.rs) and panics (task.rs):
//!     SIGTERM/SIGINT/SIGQUIT or escaped panic
//!     → ShutdownTrigger → root token cancelled
//!
//! Shutdown (orchestrator.rs, shutdown.rs):
//!     Stop supervisors → Join tasks → Hooks in ascending priority
//! ```
//!
//! # Design Decisions
//! - One root token; every component derives a child from it
//! - One shutdown channel shared by signals, panics and explicit requests
//! - Hooks run one at a time, a panicking hook does not abort the rest

pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;
pub mod task;

pub use orchestrator::Orchestrator;
pub use shutdown::{Priority, ShutdownHook, ShutdownHooks, ShutdownReason, ShutdownTrigger};
pub use startup::{build_service, Service, StartupError};
pub use supervisor::{LeaderSupervisor, Subsystem};
pub use task::{panic_message, PanicBarrier};
