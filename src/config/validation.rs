//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and cross-field rules.
//! All violations are collected so an operator can fix a file in one pass.

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{CircuitBreakerSettings, OpsConfig, PLACEHOLDER_API_KEY};

/// One hundred years.
const MAX_RETENTION_DAYS: u32 = 36_500;
/// Thirty days.
const MAX_BREAKER_WINDOW_MS: u64 = 30 * 24 * 60 * 60 * 1000;
const MAX_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;
const MAX_GRACE_PERIOD_SECS: u64 = 60 * 60;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &OpsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let backup = &config.backup;
    if backup.backup_path.trim().is_empty() {
        errors.push(ValidationError::new("backup.backup_path", "must not be empty"));
    }
    if let Err(e) = Url::parse(&backup.database_url) {
        errors.push(ValidationError::new(
            "backup.database_url",
            format!("not a valid URL: {}", e),
        ));
    }
    if matches!(&backup.encryption_key, Some(key) if key.is_empty()) {
        errors.push(ValidationError::new(
            "backup.encryption_key",
            "must not be empty when set",
        ));
    }
    if backup.retention_days > MAX_RETENTION_DAYS {
        errors.push(ValidationError::new(
            "backup.retention_days",
            format!("must be at most {}", MAX_RETENTION_DAYS),
        ));
    }
    if backup.dump_command.trim().is_empty() {
        errors.push(ValidationError::new("backup.dump_command", "must not be empty"));
    }
    if backup.restore_command.trim().is_empty() {
        errors.push(ValidationError::new("backup.restore_command", "must not be empty"));
    }
    if !backup.dump_args.iter().any(|a| a.contains("{path}")) {
        errors.push(ValidationError::new(
            "backup.dump_args",
            "must reference the {path} placeholder",
        ));
    }
    if !backup.restore_args.iter().any(|a| a.contains("{path}")) {
        errors.push(ValidationError::new(
            "backup.restore_args",
            "must reference the {path} placeholder",
        ));
    }

    check_breaker("circuit_breaker", &config.circuit_breaker, &mut errors);
    for (name, settings) in &config.breakers {
        check_breaker(&format!("breakers.{}", name), settings, &mut errors);
    }

    if config.scheduler.enabled && config.scheduler.interval_secs == 0 {
        errors.push(ValidationError::new(
            "scheduler.interval_secs",
            "must be greater than zero",
        ));
    }
    if config.scheduler.interval_secs > MAX_INTERVAL_SECS {
        errors.push(ValidationError::new(
            "scheduler.interval_secs",
            format!("must be at most {}", MAX_INTERVAL_SECS),
        ));
    }
    if config.shutdown.grace_period_secs > MAX_GRACE_PERIOD_SECS {
        errors.push(ValidationError::new(
            "shutdown.grace_period_secs",
            format!("must be at most {}", MAX_GRACE_PERIOD_SECS),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::new(
                "admin.api_key",
                "must be changed from the placeholder when the admin API is enabled",
            ));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_breaker(prefix: &str, settings: &CircuitBreakerSettings, errors: &mut Vec<ValidationError>) {
    if settings.failure_threshold == 0 {
        errors.push(ValidationError::new(
            format!("{}.failure_threshold", prefix),
            "must be greater than zero",
        ));
    }
    if settings.recovery_timeout_ms == 0 {
        errors.push(ValidationError::new(
            format!("{}.recovery_timeout_ms", prefix),
            "must be greater than zero",
        ));
    } else if settings.recovery_timeout_ms > MAX_BREAKER_WINDOW_MS {
        errors.push(ValidationError::new(
            format!("{}.recovery_timeout_ms", prefix),
            format!("must be at most {}", MAX_BREAKER_WINDOW_MS),
        ));
    }
    match settings.monitoring_period_ms {
        Some(0) => errors.push(ValidationError::new(
            format!("{}.monitoring_period_ms", prefix),
            "must be greater than zero when set",
        )),
        Some(ms) if ms > MAX_BREAKER_WINDOW_MS => errors.push(ValidationError::new(
            format!("{}.monitoring_period_ms", prefix),
            format!("must be at most {}", MAX_BREAKER_WINDOW_MS),
        )),
        _ => {}
    }
}
