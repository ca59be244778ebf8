//! Backup error definitions.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors that can occur while creating, verifying or restoring backups.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The dump command could not be started or exited unsuccessfully.
    #[error("database dump failed ({status}): {stderr}")]
    DumpFailed { status: String, stderr: String },

    /// No metadata sidecar exists for the requested backup.
    #[error("backup metadata not found: {0}")]
    MetadataNotFound(String),

    /// The sidecar exists but the artifact it describes does not.
    #[error("backup artifact missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// The artifact's hash differs from the recorded one; it must not be applied.
    #[error("checksum mismatch for backup {id}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    /// The backup is encrypted but no key is configured.
    #[error("backup {0} is encrypted but no encryption key is configured")]
    DecryptionKeyMissing(String),

    /// Wrong key, tampered ciphertext, or a truncated stream.
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The restore command could not be started or exited unsuccessfully.
    #[error("database restore failed ({status}): {stderr}")]
    RestoreFailed { status: String, stderr: String },

    /// A sidecar could not be parsed.
    #[error("invalid backup metadata in {}: {source}", .path.display())]
    InvalidMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A sidecar whose recorded id differs from the backup its file name names.
    #[error("backup metadata in {} names a different backup: {found}", .path.display())]
    MetadataIdMismatch { path: PathBuf, found: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking pipeline stage panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BackupError {
    pub(crate) fn dump_failed(status: Option<ExitStatus>, stderr: impl Into<String>) -> Self {
        BackupError::DumpFailed {
            status: describe_status(status),
            stderr: stderr.into(),
        }
    }

    pub(crate) fn restore_failed(status: Option<ExitStatus>, stderr: impl Into<String>) -> Self {
        BackupError::RestoreFailed {
            status: describe_status(status),
            stderr: stderr.into(),
        }
    }

    /// True when the stored artifact can no longer be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            BackupError::ChecksumMismatch { .. } | BackupError::Decryption(_)
        )
    }
}

fn describe_status(status: Option<ExitStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "not started".to_string(),
    }
}

/// Result alias for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;
