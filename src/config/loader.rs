//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::OpsConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `backup.database_url`.
pub const ENV_DATABASE_URL: &str = "CRM_OPS_DATABASE_URL";
/// Environment variable overriding `backup.encryption_key`.
pub const ENV_ENCRYPTION_KEY: &str = "CRM_OPS_ENCRYPTION_KEY";
/// Environment variable overriding `admin.api_key`.
pub const ENV_ADMIN_API_KEY: &str = "CRM_OPS_ADMIN_API_KEY";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides to, and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<OpsConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: OpsConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay secrets from the environment so they can stay out of the file.
pub fn apply_env_overrides<F>(config: &mut OpsConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_DATABASE_URL) {
        config.backup.database_url = url;
    }
    if let Some(key) = lookup(ENV_ENCRYPTION_KEY) {
        config.backup.encryption_key = Some(key);
    }
    if let Some(key) = lookup(ENV_ADMIN_API_KEY) {
        config.admin.api_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [backup]
            backup_path = "/var/backups/crm"
            retention_days = 7
            compression_enabled = false
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.backup.backup_path, "/var/backups/crm");
        assert_eq!(config.backup.retention_days, 7);
        assert!(!config.backup.compression_enabled);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[circuit_breaker]\nfailure_threshold = 0").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref v) if v.len() == 1));
        assert!(err.to_string().contains("circuit_breaker.failure_threshold"));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backup\nretention_days = ").unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = OpsConfig::default();
        apply_env_overrides(&mut config, |key| match key {
            ENV_ENCRYPTION_KEY => Some("s3cret".into()),
            ENV_DATABASE_URL => Some("postgres://db.internal/crm".into()),
            _ => None,
        });

        assert_eq!(config.backup.encryption_key.as_deref(), Some("s3cret"));
        assert_eq!(config.backup.database_url, "postgres://db.internal/crm");
        assert_eq!(config.admin.api_key, crate::config::schema::PLACEHOLDER_API_KEY);
    }
}
