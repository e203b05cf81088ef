//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! coordinator. All types derive Serde traits for deserialization from
//! config files, and every section falls back to its defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::election::ElectionConfig;
use crate::scheduler::StopMode;

/// Root configuration for the coordinator process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Tokio runtime sizing.
    pub runtime: RuntimeConfig,

    /// Leader election settings.
    pub election: ElectionSettings,

    /// Lock store backend.
    pub locker: LockerConfig,

    /// Scheduler-wide settings.
    pub scheduler: SchedulerConfig,

    /// Heartbeat jobs run while this process leads.
    pub jobs: Vec<JobSettings>,

    /// Calendar heartbeat jobs run while this process leads.
    pub cron: Vec<CronSettings>,

    /// Readiness barrier settings.
    pub readiness: ReadinessConfig,

    /// Probe HTTP server.
    pub probes: ProbeConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads; unset means one per core.
    pub worker_threads: Option<usize>,
}

/// Leader election configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ElectionSettings {
    /// Election name, shared by every replica contending for the same role.
    pub name: String,

    /// Lease duration in milliseconds.
    pub expiration_ms: u64,

    /// Per store call timeout in milliseconds; unset means a third of the lease.
    pub operation_timeout_ms: Option<u64>,
}

impl Default for ElectionSettings {
    fn default() -> Self {
        Self {
            name: "service-coordinator".to_string(),
            expiration_ms: 30_000,
            operation_timeout_ms: None,
        }
    }
}

impl ElectionSettings {
    pub fn to_election_config(&self) -> ElectionConfig {
        let config = ElectionConfig::new(self.name.clone())
            .with_expiration(Duration::from_millis(self.expiration_ms));
        match self.operation_timeout_ms {
            Some(ms) => config.with_operation_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }
}

/// Lock store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockerBackend {
    /// Process-local store; single-node deployments only.
    #[default]
    Memory,
    /// Shared Redis store.
    Redis,
}

/// Lock store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockerConfig {
    pub backend: LockerBackend,

    /// Redis connection URL (e.g., "redis://127.0.0.1:6379").
    pub redis_url: Option<String>,

    /// Namespace prepended to every lock key.
    pub key_prefix: String,
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            backend: LockerBackend::default(),
            redis_url: None,
            key_prefix: crate::locker::DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum concurrent job executions.
    pub rate: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { rate: 4 }
    }
}

/// One configured job.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobSettings {
    /// Unique job name.
    pub name: String,

    /// Tick interval in milliseconds.
    pub tick_ms: u64,

    /// Per execution deadline in milliseconds; defaults to the tick.
    #[serde(default)]
    pub deadline_ms: Option<u64>,

    #[serde(default)]
    pub stop_mode: StopMode,
}

/// One configured calendar job.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CronSettings {
    /// Unique job name.
    pub name: String,

    /// Six-field cron expression, seconds first (e.g. "*/10 * * * * *").
    pub schedule: String,
}

/// Readiness barrier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub name: String,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            name: "service-coordinator".to_string(),
        }
    }
}

/// Probe server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Emit JSON log lines instead of plain text.
    pub json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            json: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
