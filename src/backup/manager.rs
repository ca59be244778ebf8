//! Backup orchestration.
//!
//! # Pipelines
//! ```text
//! create:  dump → <id>.sql → [gzip] → <id>.sql.gz → [encrypt] → <id>.sql[.gz].enc
//!          → sha256 + size → <id>.metadata.json
//! restore: <id>.metadata.json → checksum gate → [decrypt] → [gunzip] → apply SQL
//! ```
//!
//! # Design Decisions
//! - The checksum gate runs before anything touches the database
//! - Intermediate files are [`ScratchFile`]s, removed on every exit path
//! - `list_backups` and `cleanup_old_backups` skip bad items instead of failing
//! - Creation is serialized per manager; ids carry millisecond precision

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::backup::checksum::sha256_file;
use crate::backup::compression::{gunzip_file, gzip_file};
use crate::backup::database::{redact_url, CommandTool, DatabaseTool};
use crate::backup::encryption::{decrypt_file, encrypt_file};
use crate::backup::error::{BackupError, BackupResult};
use crate::backup::metadata::{artifact_file_name, generate_backup_id, id_from_sidecar, sidecar_path, BackupMetadata};
use crate::backup::scratch::ScratchFile;
use crate::config::BackupConfig;
use crate::observability::metrics;
use crate::observability::tracing::traced;

/// Outcome of a retention pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    /// Ids whose artifact and sidecar were removed.
    pub deleted: Vec<String>,
    /// Ids that were due but could not be removed.
    pub failed: Vec<String>,
}

/// Creates, verifies, restores, lists and prunes database backups.
pub struct BackupManager {
    config: BackupConfig,
    dir: PathBuf,
    tool: Arc<dyn DatabaseTool>,
    create_lock: Mutex<()>,
}

impl BackupManager {
    pub fn new(config: BackupConfig, tool: Arc<dyn DatabaseTool>) -> Self {
        let dir = PathBuf::from(&config.backup_path);
        Self {
            config,
            dir,
            tool,
            create_lock: Mutex::new(()),
        }
    }

    /// Manager backed by the configured dump/restore programs.
    pub fn from_config(config: BackupConfig) -> Self {
        let tool = Arc::new(CommandTool::from_config(&config));
        Self::new(config, tool)
    }

    pub fn backup_dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    fn encryption_key(&self) -> Option<&str> {
        self.config.encryption_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Dump the database and run it through the configured pipeline.
    pub async fn create_backup(&self) -> BackupResult<BackupMetadata> {
        let result = traced("backup.create", self.run_create()).await;
        metrics::record_backup_operation("create", result.is_ok());
        match &result {
            Ok(meta) => {
                metrics::record_backup_size(meta.size);
                tracing::info!(
                    id = %meta.id,
                    size = meta.size,
                    compressed = meta.compressed,
                    encrypted = meta.encrypted,
                    "Backup created"
                );
            }
            Err(e) => tracing::error!(error = %e, "Backup creation failed"),
        }
        result
    }

    async fn run_create(&self) -> BackupResult<BackupMetadata> {
        let _serialized = self.create_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;

        let (id, timestamp) = self.unused_id().await?;
        tracing::info!(
            id = %id,
            database = %redact_url(&self.config.database_url),
            "Starting database backup"
        );

        let raw = ScratchFile::new(self.dir.join(artifact_file_name(&id, false, false)));
        self.tool.dump(&self.config.database_url, &raw).await?;
        let mut working = raw;

        let compressed = self.config.compression_enabled;
        if compressed {
            let gz = ScratchFile::new(self.dir.join(artifact_file_name(&id, true, false)));
            gzip_file(&working, &gz).await?;
            // Replacing the guard removes the uncompressed dump.
            working = gz;
        }

        let encrypted = match self.encryption_key() {
            Some(key) => {
                let enc = ScratchFile::new(self.dir.join(artifact_file_name(&id, compressed, true)));
                encrypt_file(&working, &enc, key).await?;
                working = enc;
                true
            }
            None => false,
        };

        let checksum = sha256_file(&working).await?;
        let size = tokio::fs::metadata(working.path()).await?.len();

        let metadata = BackupMetadata {
            id,
            timestamp,
            size,
            compressed,
            encrypted,
            checksum,
            version: crate::VERSION.to_string(),
        };
        metadata.save(&self.dir).await?;
        working.keep();

        Ok(metadata)
    }

    /// A fresh id; waits out the current millisecond if a backup already claimed it.
    async fn unused_id(&self) -> BackupResult<(String, chrono::DateTime<Utc>)> {
        loop {
            let now = Utc::now().trunc_subsecs(3);
            let id = generate_backup_id(now);
            let taken = tokio::fs::try_exists(sidecar_path(&self.dir, &id)).await?
                || tokio::fs::try_exists(self.dir.join(artifact_file_name(&id, false, false))).await?;
            if !taken {
                return Ok((id, now));
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Check that a backup's artifact exists and matches its recorded checksum.
    pub async fn verify_backup(&self, id: &str) -> BackupResult<BackupMetadata> {
        let result = traced("backup.verify", self.run_verify(id)).await;
        metrics::record_backup_operation("verify", result.is_ok());
        result
    }

    async fn run_verify(&self, id: &str) -> BackupResult<BackupMetadata> {
        check_id(id)?;
        let metadata = BackupMetadata::load(&self.dir, id).await?;
        let artifact = metadata.artifact_path(&self.dir);
        if !tokio::fs::try_exists(&artifact).await? {
            return Err(BackupError::ArtifactMissing(artifact));
        }

        let actual = sha256_file(&artifact).await?;
        if actual != metadata.checksum {
            tracing::error!(
                id = %id,
                expected = %metadata.checksum,
                actual = %actual,
                "Backup checksum mismatch, artifact is corrupt"
            );
            return Err(BackupError::ChecksumMismatch {
                id: id.to_string(),
                expected: metadata.checksum,
                actual,
            });
        }
        Ok(metadata)
    }

    /// Verify a backup, undo its pipeline, and apply it to the database.
    pub async fn restore_backup(&self, id: &str) -> BackupResult<BackupMetadata> {
        let result = traced("backup.restore", self.run_restore(id)).await;
        metrics::record_backup_operation("restore", result.is_ok());
        match &result {
            Ok(_) => tracing::info!(id = %id, "Backup restored"),
            Err(e) => tracing::error!(id = %id, error = %e, "Backup restore failed"),
        }
        result
    }

    async fn run_restore(&self, id: &str) -> BackupResult<BackupMetadata> {
        let metadata = self.run_verify(id).await?;
        tracing::info!(
            id = %id,
            database = %redact_url(&self.config.database_url),
            "Restoring database backup"
        );

        // Guards live until the end of this function, so every exit removes them.
        let mut scratch: Vec<ScratchFile> = Vec::new();
        let mut source = metadata.artifact_path(&self.dir);

        if metadata.encrypted {
            let key = self
                .encryption_key()
                .ok_or_else(|| BackupError::DecryptionKeyMissing(id.to_string()))?;
            let suffix = if metadata.compressed { ".sql.gz" } else { ".sql" };
            let out = ScratchFile::new(self.dir.join(format!(".{}.restore{}", id, suffix)));
            decrypt_file(&source, &out, key).await?;
            source = out.to_path_buf();
            scratch.push(out);
        }

        if metadata.compressed {
            let out = ScratchFile::new(self.dir.join(format!(".{}.restore.sql", id)));
            gunzip_file(&source, &out).await?;
            source = out.to_path_buf();
            scratch.push(out);
        }

        self.tool.restore(&self.config.database_url, &source).await?;
        drop(scratch);
        Ok(metadata)
    }

    /// All readable backups, newest first.
    pub async fn list_backups(&self) -> BackupResult<Vec<BackupMetadata>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(id) = id_from_sidecar(name) else {
                continue;
            };

            let path = entry.path();
            let loaded = match tokio::fs::read(&path).await {
                Ok(bytes) => BackupMetadata::from_slice(&path, id, &bytes),
                Err(e) => Err(e.into()),
            };
            match loaded {
                Ok(metadata) => backups.push(metadata),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable backup metadata"),
            }
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    /// Remove every backup at or before `now - retention_days`.
    pub async fn cleanup_old_backups(&self) -> BackupResult<CleanupReport> {
        let mut report = CleanupReport::default();
        let Some(cutoff) = chrono::Duration::try_days(i64::from(self.config.retention_days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            tracing::info!(
                retention_days = self.config.retention_days,
                "Retention window reaches past the earliest representable time, nothing to prune"
            );
            return Ok(report);
        };

        for backup in self.list_backups().await? {
            if backup.timestamp > cutoff {
                continue;
            }
            match self.remove_files(&backup).await {
                Ok(()) => {
                    tracing::info!(id = %backup.id, timestamp = %backup.timestamp, "Pruned expired backup");
                    report.deleted.push(backup.id);
                }
                Err(e) => {
                    tracing::warn!(id = %backup.id, error = %e, "Failed to prune backup");
                    report.failed.push(backup.id);
                }
            }
        }

        metrics::record_backups_pruned(report.deleted.len());
        tracing::info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            retention_days = self.config.retention_days,
            "Backup retention pass finished"
        );
        Ok(report)
    }

    /// Remove one backup's artifact and sidecar.
    pub async fn delete_backup(&self, id: &str) -> BackupResult<()> {
        check_id(id)?;
        let metadata = BackupMetadata::load(&self.dir, id).await?;
        self.remove_files(&metadata).await?;
        tracing::info!(id = %id, "Backup deleted");
        Ok(())
    }

    /// Artifact first: a leftover sidecar stays visible and can be retried.
    async fn remove_files(&self, metadata: &BackupMetadata) -> BackupResult<()> {
        remove_if_present(&metadata.artifact_path(&self.dir)).await?;
        remove_if_present(&metadata.sidecar_path(&self.dir)).await
    }
}

async fn remove_if_present(path: &Path) -> BackupResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Ids become file names; anything outside `[A-Za-z0-9_-]` cannot name a backup.
fn check_id(id: &str) -> BackupResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BackupError::MetadataNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_id_rejects_paths() {
        assert!(check_id("backup-2026-10-19T03-04-05-678Z").is_ok());
        assert!(check_id("../etc/passwd").is_err());
        assert!(check_id("backup/1").is_err());
        assert!(check_id("").is_err());
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackupConfig {
            backup_path: dir.path().join("not-yet").to_string_lossy().into_owned(),
            ..Default::default()
        };
        let manager = BackupManager::from_config(config);
        assert!(manager.list_backups().await.unwrap().is_empty());
    }
}
