//! Backup metadata sidecars.
//!
//! Each backup is two files tied by id: the artifact `<id>.sql[.gz][.enc]`
//! and the sidecar `<id>.metadata.json`. The sidecar stores flags rather than
//! a path, so the artifact name is reconstructed and the backup directory can
//! move between machines.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::backup::error::{BackupError, BackupResult};

pub const SQL_EXTENSION: &str = ".sql";
pub const GZIP_EXTENSION: &str = ".gz";
pub const ENCRYPTED_EXTENSION: &str = ".enc";
pub const METADATA_SUFFIX: &str = ".metadata.json";

/// Description of one backup artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Size of the final artifact in bytes.
    pub size: u64,
    pub compressed: bool,
    pub encrypted: bool,
    /// SHA-256 of the final artifact, lowercase hex.
    pub checksum: String,
    /// Version of the software that wrote the backup.
    pub version: String,
}

impl BackupMetadata {
    /// Artifact file name implied by the pipeline flags.
    pub fn artifact_file_name(&self) -> String {
        artifact_file_name(&self.id, self.compressed, self.encrypted)
    }

    pub fn artifact_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.artifact_file_name())
    }

    pub fn sidecar_path(&self, dir: &Path) -> PathBuf {
        sidecar_path(dir, &self.id)
    }

    /// Load the sidecar for `id` from `dir`.
    pub async fn load(dir: &Path, id: &str) -> BackupResult<Self> {
        let path = sidecar_path(dir, id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackupError::MetadataNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_slice(&path, id, &bytes)
    }

    /// Parse a sidecar read from `path`, which must describe backup `id`.
    pub(crate) fn from_slice(path: &Path, id: &str, bytes: &[u8]) -> BackupResult<Self> {
        let metadata: Self = serde_json::from_slice(bytes).map_err(|source| BackupError::InvalidMetadata {
            path: path.to_path_buf(),
            source,
        })?;
        // File operations derive paths from `metadata.id`.
        if metadata.id != id {
            return Err(BackupError::MetadataIdMismatch {
                path: path.to_path_buf(),
                found: metadata.id,
            });
        }
        Ok(metadata)
    }

    /// Write the sidecar atomically: temp file then rename.
    pub async fn save(&self, dir: &Path) -> BackupResult<PathBuf> {
        let path = self.sidecar_path(dir);
        let tmp = dir.join(format!(".{}{}.tmp", self.id, METADATA_SUFFIX));
        let json = serde_json::to_vec_pretty(self).map_err(|source| BackupError::InvalidMetadata {
            path: path.clone(),
            source,
        })?;

        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(path)
    }
}

/// `backup-<ISO timestamp>` with `:` and `.` replaced so the id is a safe file name.
pub fn generate_backup_id(now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("backup-{}", stamp)
}

pub fn artifact_file_name(id: &str, compressed: bool, encrypted: bool) -> String {
    let mut name = format!("{}{}", id, SQL_EXTENSION);
    if compressed {
        name.push_str(GZIP_EXTENSION);
    }
    if encrypted {
        name.push_str(ENCRYPTED_EXTENSION);
    }
    name
}

pub fn sidecar_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}{}", id, METADATA_SUFFIX))
}

/// Backup id for a sidecar file name, if it is one.
pub fn id_from_sidecar(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(METADATA_SUFFIX)
        .filter(|id| !id.is_empty() && !id.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(compressed: bool, encrypted: bool) -> BackupMetadata {
        BackupMetadata {
            id: "backup-2026-03-01T02-00-00-000Z".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap(),
            size: 42,
            compressed,
            encrypted,
            checksum: "ab".repeat(32),
            version: "0.1.0".into(),
        }
    }

    #[test]
    fn test_generate_id_is_filename_safe() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 3, 4, 5).unwrap()
            + chrono::Duration::milliseconds(678);
        let id = generate_backup_id(now);
        assert_eq!(id, "backup-2026-10-19T03-04-05-678Z");
        assert!(!id.contains(':') && !id.contains('.'));
    }

    #[test]
    fn test_artifact_name_reconstruction() {
        assert_eq!(sample(false, false).artifact_file_name(), "backup-2026-03-01T02-00-00-000Z.sql");
        assert_eq!(sample(true, false).artifact_file_name(), "backup-2026-03-01T02-00-00-000Z.sql.gz");
        assert_eq!(sample(false, true).artifact_file_name(), "backup-2026-03-01T02-00-00-000Z.sql.enc");
        assert_eq!(sample(true, true).artifact_file_name(), "backup-2026-03-01T02-00-00-000Z.sql.gz.enc");
    }

    #[test]
    fn test_id_from_sidecar() {
        assert_eq!(id_from_sidecar("backup-1.metadata.json"), Some("backup-1"));
        assert_eq!(id_from_sidecar("backup-1.sql.gz"), None);
        assert_eq!(id_from_sidecar(".backup-1.metadata.json"), None);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let meta = sample(true, true);
        let path = meta.save(dir.path()).await.unwrap();
        assert!(path.ends_with("backup-2026-03-01T02-00-00-000Z.metadata.json"));

        let loaded = BackupMetadata::load(dir.path(), &meta.id).await.unwrap();
        assert_eq!(loaded, meta);

        let missing = BackupMetadata::load(dir.path(), "backup-nope").await.unwrap_err();
        assert!(matches!(missing, BackupError::MetadataNotFound(id) if id == "backup-nope"));
    }

    #[tokio::test]
    async fn test_load_rejects_corrupt_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(sidecar_path(dir.path(), "backup-bad"), b"{ not json").await.unwrap();
        let err = BackupMetadata::load(dir.path(), "backup-bad").await.unwrap_err();
        assert!(matches!(err, BackupError::InvalidMetadata { .. }));
    }

    #[tokio::test]
    async fn test_load_rejects_sidecar_for_another_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = sample(false, false);
        meta.id = "../victim".into();
        let json = serde_json::to_vec(&meta).unwrap();
        tokio::fs::write(sidecar_path(dir.path(), "backup-x"), json).await.unwrap();

        let err = BackupMetadata::load(dir.path(), "backup-x").await.unwrap_err();
        assert!(matches!(err, BackupError::MetadataIdMismatch { ref found, .. } if found == "../victim"));
    }
}
