//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rate > 0, ticks > 0, addresses parse)
//! - Detect duplicate job names across fixed-tick and cron jobs
//! - Parse cron expressions up front
//! - Check that the selected lock backend is fully configured
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CoordinatorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{CoordinatorConfig, LockerBackend};
use crate::scheduler::cron::parse_schedule;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("election.name must not be empty")]
    EmptyElectionName,

    #[error("election.expiration_ms must be positive")]
    ZeroExpiration,

    #[error("scheduler.rate must be positive")]
    ZeroRate,

    #[error("runtime.worker_threads must be positive")]
    ZeroWorkerThreads,

    #[error("job {0}: name must not be empty")]
    EmptyJobName(usize),

    #[error("job {0}: tick_ms must be positive")]
    ZeroTick(String),

    #[error("job {0}: deadline_ms must be positive")]
    ZeroDeadline(String),

    #[error("job {0}: defined more than once")]
    DuplicateJob(String),

    #[error("cron job {name}: invalid schedule {schedule:?}: {reason}")]
    InvalidSchedule {
        name: String,
        schedule: String,
        reason: String,
    },

    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("locker.redis_url is required for the redis backend")]
    MissingRedisUrl,

    #[error("locker.backend = \"redis\" requires the `redis` feature")]
    RedisUnsupported,
}

/// Check `config` and collect every problem found.
pub fn validate_config(config: &CoordinatorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.election.name.trim().is_empty() {
        errors.push(ValidationError::EmptyElectionName);
    }
    if config.election.expiration_ms == 0 {
        errors.push(ValidationError::ZeroExpiration);
    }
    if config.scheduler.rate == 0 {
        errors.push(ValidationError::ZeroRate);
    }
    if config.runtime.worker_threads == Some(0) {
        errors.push(ValidationError::ZeroWorkerThreads);
    }

    let mut seen = HashSet::new();
    for (index, job) in config.jobs.iter().enumerate() {
        if job.name.is_empty() {
            errors.push(ValidationError::EmptyJobName(index));
            continue;
        }
        if job.tick_ms == 0 {
            errors.push(ValidationError::ZeroTick(job.name.clone()));
        }
        if job.deadline_ms == Some(0) {
            errors.push(ValidationError::ZeroDeadline(job.name.clone()));
        }
        if !seen.insert(job.name.as_str()) {
            errors.push(ValidationError::DuplicateJob(job.name.clone()));
        }
    }
    for (index, job) in config.cron.iter().enumerate() {
        if job.name.is_empty() {
            errors.push(ValidationError::EmptyJobName(config.jobs.len() + index));
            continue;
        }
        if let Err(reason) = parse_schedule(&job.schedule) {
            errors.push(ValidationError::InvalidSchedule {
                name: job.name.clone(),
                schedule: job.schedule.clone(),
                reason,
            });
        }
        if !seen.insert(job.name.as_str()) {
            errors.push(ValidationError::DuplicateJob(job.name.clone()));
        }
    }

    if config.probes.enabled {
        check_address(&mut errors, "probes.bind_address", &config.probes.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.locker.backend == LockerBackend::Redis {
        if config.locker.redis_url.as_deref().map_or(true, str::is_empty) {
            errors.push(ValidationError::MissingRedisUrl);
        }
        if !cfg!(feature = "redis") {
            errors.push(ValidationError::RedisUnsupported);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CronSettings, JobSettings};
    use crate::scheduler::StopMode;

    fn job(name: &str, tick_ms: u64) -> JobSettings {
        JobSettings {
            name: name.to_string(),
            tick_ms,
            deadline_ms: None,
            stop_mode: StopMode::Immediate,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&CoordinatorConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_violation() {
        let mut config = CoordinatorConfig::default();
        config.election.name = "  ".to_string();
        config.scheduler.rate = 0;
        config.jobs = vec![job("sync", 1000), job("sync", 0)];
        config.probes.bind_address = "not-an-address".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyElectionName,
                ValidationError::ZeroRate,
                ValidationError::ZeroTick("sync".into()),
                ValidationError::DuplicateJob("sync".into()),
                ValidationError::InvalidAddress {
                    field: "probes.bind_address",
                    value: "not-an-address".into(),
                },
            ]
        );
    }

    #[test]
    fn test_redis_backend_needs_url() {
        let mut config = CoordinatorConfig::default();
        config.locker.backend = LockerBackend::Redis;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingRedisUrl));
    }

    #[test]
    fn test_cron_jobs_checked_with_fixed_jobs() {
        let mut config = CoordinatorConfig::default();
        config.jobs = vec![job("sync", 1000)];
        config.cron = vec![
            CronSettings {
                name: "sync".to_string(),
                schedule: "0 */5 * * * *".to_string(),
            },
            CronSettings {
                name: "nightly".to_string(),
                schedule: "0 3 * * *".to_string(),
            },
            CronSettings {
                name: "report".to_string(),
                schedule: "0 0 8 * * Mon-Fri".to_string(),
            },
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], ValidationError::DuplicateJob("sync".into()));
        assert!(matches!(
            &errors[1],
            ValidationError::InvalidSchedule { name, .. } if name == "nightly"
        ));
    }
}
