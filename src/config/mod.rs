//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, environment overrides for secrets)
//!     → validation.rs (semantic checks)
//!     → OpsConfig (validated, immutable)
//!     → cloned sections handed to each subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Secrets (database URL, encryption key, admin key) can come from the environment

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AdminConfig;
pub use schema::BackupConfig;
pub use schema::CircuitBreakerSettings;
pub use schema::ObservabilityConfig;
pub use schema::OpsConfig;
pub use schema::SchedulerConfig;
