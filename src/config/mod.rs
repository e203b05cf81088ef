//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CoordinatorConfig (validated, immutable)
//!     → startup builds every component from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CoordinatorConfig, CronSettings, ElectionSettings, JobSettings, LockerBackend, LockerConfig,
    ObservabilityConfig, ProbeConfig, ReadinessConfig, RuntimeConfig, SchedulerConfig,
};
pub use validation::{validate_config, ValidationError};
