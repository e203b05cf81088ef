//! Lifecycle and leadership coordination for long-running services.

pub mod config;
pub mod election;
pub mod health;
pub mod lifecycle;
pub mod locker;
pub mod observability;
pub mod resilience;
pub mod scheduler;

pub use config::schema::CoordinatorConfig;
pub use election::{ElectionConfig, LeaderWatchdog, LeadershipEvent};
pub use health::{ReadinessBarrier, ReadinessSignal};
pub use lifecycle::{LeaderSupervisor, Orchestrator, Priority, Subsystem};
pub use locker::{InMemoryLocker, Locker};
pub use scheduler::{CronScheduler, JobConfig, JobScheduler, StopMode};
