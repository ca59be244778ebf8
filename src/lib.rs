//! CRM operations daemon library: circuit breakers and database backups.

pub mod admin;
pub mod backup;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

/// Version recorded in backup metadata and reported by the admin API.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use backup::{BackupError, BackupManager, BackupMetadata};
pub use config::OpsConfig;
pub use lifecycle::Shutdown;
pub use resilience::{CircuitBreaker, CircuitBreakerError, CircuitBreakerRegistry, CircuitState};
