//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the ops service.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the ops service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OpsConfig {
    /// Database backup settings.
    pub backup: BackupConfig,

    /// Default settings applied to every circuit breaker.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Per-dependency breaker overrides, keyed by breaker name.
    pub breakers: HashMap<String, CircuitBreakerSettings>,

    /// Periodic backup job.
    pub scheduler: SchedulerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,
}

/// Database backup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Connection URL handed to the dump/restore commands.
    pub database_url: String,

    /// Directory holding backup artifacts and their metadata sidecars.
    pub backup_path: String,

    /// Backups older than this many days are pruned.
    pub retention_days: u32,

    /// Gzip the dump before (optional) encryption.
    pub compression_enabled: bool,

    /// Passphrase for artifact encryption. Encryption is off when unset.
    pub encryption_key: Option<String>,

    /// Program producing the SQL dump.
    pub dump_command: String,

    /// Arguments for the dump program. `{url}` and `{path}` are substituted.
    pub dump_args: Vec<String>,

    /// Program applying a SQL file to the database.
    pub restore_command: String,

    /// Arguments for the restore program. `{url}` and `{path}` are substituted.
    pub restore_args: Vec<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost:5432/crm".to_string(),
            backup_path: "./backups".to_string(),
            retention_days: 30,
            compression_enabled: true,
            encryption_key: None,
            dump_command: "pg_dump".to_string(),
            dump_args: vec![
                "--dbname".to_string(),
                "{url}".to_string(),
                "--file".to_string(),
                "{path}".to_string(),
            ],
            restore_command: "psql".to_string(),
            restore_args: vec![
                "--dbname".to_string(),
                "{url}".to_string(),
                "--file".to_string(),
                "{path}".to_string(),
                "-v".to_string(),
                "ON_ERROR_STOP=1".to_string(),
            ],
        }
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Counted failures that trip the breaker.
    pub failure_threshold: u32,

    /// Milliseconds the breaker stays open before admitting a trial call.
    pub recovery_timeout_ms: u64,

    /// When set, a failure arriving more than this many milliseconds after the
    /// previous one starts a fresh count.
    pub monitoring_period_ms: Option<u64>,

    /// Failures whose message contains one of these substrings are ignored.
    pub expected_errors: Vec<String>,
}

impl CircuitBreakerSettings {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Option<Duration> {
        self.monitoring_period_ms.map(Duration::from_millis)
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            monitoring_period_ms: None,
            expected_errors: Vec::new(),
        }
    }
}

/// Periodic backup job configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the backup job.
    pub enabled: bool,

    /// Seconds between backups.
    pub interval_secs: u64,

    /// Prune expired backups after each successful run.
    pub cleanup_after_backup: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 24 * 60 * 60,
            cleanup_after_backup: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Placeholder admin key; the service refuses to expose the admin API with it.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,

    /// Per-request timeout in seconds. Restores of large dumps need headroom.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 3600,
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Seconds to wait for background tasks after the shutdown signal.
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 30,
        }
    }
}

impl OpsConfig {
    /// Effective breaker settings for a dependency name.
    pub fn breaker_settings(&self, name: &str) -> CircuitBreakerSettings {
        self.breakers
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.circuit_breaker.clone())
    }
}
