//! Periodic job scheduling.
//!
//! # Responsibilities
//! - Run named jobs on fixed ticks, at most one execution per job at a time
//! - Bound concurrent executions with a shared [`RateLimiter`]
//! - Apply the job's [`StopMode`] to in-flight executions on stop
//! - Run calendar jobs from cron expressions through [`CronScheduler`]
//!
//! # Design Decisions
//! - Ticks that fire during an execution are dropped, never queued
//! - Every execution gets its own [`JobContext`] whose token is cancelled at
//!   the deadline; the scheduler still waits for the job future to return
//! - Job failures and panics are reported and never stop the job

pub mod cron;
pub mod group;
pub mod job;
pub mod limiter;
pub mod periodic;

pub use self::cron::CronScheduler;
pub use group::SchedulerGroup;
pub use job::{
    BoxError, ExecutionError, JobConfig, JobContext, JobResult, SchedulerError, StopMode,
};
pub use limiter::RateLimiter;
pub use periodic::JobScheduler;
