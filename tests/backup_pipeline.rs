//! End-to-end backup and restore through the real file pipeline.

use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};
use crm_ops::backup::BackupMetadata;
use crm_ops::BackupError;

mod common;

use common::{file_names, manager, FakeDatabase, SAMPLE_SQL};

#[tokio::test]
async fn test_roundtrip_for_every_pipeline() {
    for (compression, key) in [(false, None), (true, None), (false, Some("s3cret")), (true, Some("s3cret"))] {
        let dir = tempfile::tempdir().unwrap();
        let db = FakeDatabase::with_contents(SAMPLE_SQL);
        let manager = manager(dir.path(), compression, key, db.clone());

        let meta = manager.create_backup().await.unwrap();
        assert_eq!(meta.compressed, compression);
        assert_eq!(meta.encrypted, key.is_some());
        assert!(meta.id.starts_with("backup-"));
        assert_eq!(meta.checksum.len(), 64);
        assert_eq!(meta.version, crm_ops::VERSION);

        let artifact = meta.artifact_file_name();
        let sidecar = format!("{}.metadata.json", meta.id);
        let mut expected = vec![artifact.clone(), sidecar];
        expected.sort();
        assert_eq!(file_names(dir.path()), expected, "only artifact and sidecar remain");
        assert_eq!(
            std::fs::metadata(dir.path().join(&artifact)).unwrap().len(),
            meta.size
        );

        db.wipe();
        let restored = manager.restore_backup(&meta.id).await.unwrap();
        assert_eq!(restored, meta);
        assert_eq!(db.contents(), SAMPLE_SQL);
        assert_eq!(file_names(dir.path()), expected, "restore leaves no scratch files");
    }
}

#[tokio::test]
async fn test_artifact_names_follow_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);

    let plain = manager(dir.path(), false, None, db.clone()).create_backup().await.unwrap();
    let both = manager(dir.path(), true, Some("k"), db).create_backup().await.unwrap();

    assert_eq!(plain.artifact_file_name(), format!("{}.sql", plain.id));
    assert_eq!(both.artifact_file_name(), format!("{}.sql.gz.enc", both.id));
    assert_ne!(plain.id, both.id);
}

#[tokio::test]
async fn test_encrypted_artifact_hides_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let meta = manager(dir.path(), false, Some("s3cret"), db).create_backup().await.unwrap();

    let bytes = std::fs::read(meta.artifact_path(dir.path())).unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(!text.contains("Globex"));
}

#[tokio::test]
async fn test_tampered_artifact_never_reaches_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let manager = manager(dir.path(), true, None, db.clone());
    let meta = manager.create_backup().await.unwrap();

    let path = meta.artifact_path(dir.path());
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    let err = manager.restore_backup(&meta.id).await.unwrap_err();
    assert!(matches!(err, BackupError::ChecksumMismatch { ref expected, .. } if *expected == meta.checksum));
    assert!(err.is_corruption());
    assert_eq!(db.restores(), 0);

    assert!(matches!(
        manager.verify_backup(&meta.id).await,
        Err(BackupError::ChecksumMismatch { .. })
    ));
}

#[tokio::test]
async fn test_encrypted_restore_without_key() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let meta = manager(dir.path(), true, Some("s3cret"), db.clone())
        .create_backup()
        .await
        .unwrap();
    let before = file_names(dir.path());

    let keyless = manager(dir.path(), true, None, db.clone());
    let err = keyless.restore_backup(&meta.id).await.unwrap_err();
    assert!(matches!(err, BackupError::DecryptionKeyMissing(ref id) if *id == meta.id));
    assert_eq!(db.restores(), 0);
    assert_eq!(file_names(dir.path()), before);
}

#[tokio::test]
async fn test_wrong_key_fails_before_restore() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let meta = manager(dir.path(), false, Some("right"), db.clone())
        .create_backup()
        .await
        .unwrap();
    let before = file_names(dir.path());

    let err = manager(dir.path(), false, Some("wrong"), db.clone())
        .restore_backup(&meta.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::Decryption(_)));
    assert_eq!(db.restores(), 0);
    assert_eq!(file_names(dir.path()), before, "partial plaintext is removed");
}

#[tokio::test]
async fn test_unknown_and_orphaned_backups() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let manager = manager(dir.path(), false, None, db.clone());

    let err = manager.restore_backup("backup-1999-01-01T00-00-00-000Z").await.unwrap_err();
    assert!(matches!(err, BackupError::MetadataNotFound(_)));

    let err = manager.restore_backup("../outside").await.unwrap_err();
    assert!(matches!(err, BackupError::MetadataNotFound(_)));

    let meta = manager.create_backup().await.unwrap();
    std::fs::remove_file(meta.artifact_path(dir.path())).unwrap();
    let err = manager.restore_backup(&meta.id).await.unwrap_err();
    assert!(matches!(err, BackupError::ArtifactMissing(_)));
    assert_eq!(db.restores(), 0);
}

#[tokio::test]
async fn test_failed_dump_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    db.fail_dumps.store(true, Ordering::SeqCst);
    let manager = manager(dir.path(), true, Some("k"), db.clone());

    let err = manager.create_backup().await.unwrap_err();
    assert!(matches!(err, BackupError::DumpFailed { .. }));
    assert!(file_names(dir.path()).is_empty());
    assert!(manager.list_backups().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_is_newest_first_and_skips_corrupt_sidecars() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let manager = manager(dir.path(), true, None, db);

    let mut created = Vec::new();
    for _ in 0..3 {
        created.push(manager.create_backup().await.unwrap());
    }
    std::fs::write(dir.path().join("backup-bogus.metadata.json"), "{ not json").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "unrelated").unwrap();

    let listed = manager.list_backups().await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
    let expected: Vec<&str> = created.iter().rev().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, expected);
    assert!(listed.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

async fn backdate(dir: &std::path::Path, meta: &BackupMetadata, days: i64) -> BackupMetadata {
    let mut old = meta.clone();
    old.timestamp = Utc::now() - Duration::days(days);
    old.save(dir).await.unwrap();
    old
}

#[tokio::test]
async fn test_cleanup_removes_only_expired_backups() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let manager = manager(dir.path(), true, None, db);

    let expired = manager.create_backup().await.unwrap();
    let expired = backdate(dir.path(), &expired, 45).await;
    let fresh = manager.create_backup().await.unwrap();

    let report = manager.cleanup_old_backups().await.unwrap();
    assert_eq!(report.deleted, vec![expired.id.clone()]);
    assert!(report.failed.is_empty());

    assert!(!expired.artifact_path(dir.path()).exists());
    assert!(!expired.sidecar_path(dir.path()).exists());
    let remaining = manager.list_backups().await.unwrap();
    assert_eq!(remaining, vec![fresh]);
}

#[tokio::test]
async fn test_zero_retention_removes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let mut config = common::backup_config(dir.path(), false, None);
    config.retention_days = 0;
    let manager = crm_ops::BackupManager::new(config, db);

    manager.create_backup().await.unwrap();
    manager.create_backup().await.unwrap();

    let report = manager.cleanup_old_backups().await.unwrap();
    assert_eq!(report.deleted.len(), 2);
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn test_cleanup_with_unbounded_retention_keeps_everything() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let mut config = common::backup_config(dir.path(), false, None);
    config.retention_days = u32::MAX;
    let manager = crm_ops::BackupManager::new(config, db);

    let meta = manager.create_backup().await.unwrap();
    let report = manager.cleanup_old_backups().await.unwrap();
    assert!(report.deleted.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(manager.list_backups().await.unwrap(), vec![meta]);
}

#[tokio::test]
async fn test_cleanup_ignores_sidecars_naming_other_files() {
    let root = tempfile::tempdir().unwrap();
    let backups = root.path().join("backups");
    std::fs::create_dir(&backups).unwrap();
    let victim = root.path().join("victim.sql");
    std::fs::write(&victim, "keep me").unwrap();

    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let manager = manager(&backups, false, None, db);
    let fresh = manager.create_backup().await.unwrap();

    let mut escape = fresh.clone();
    escape.id = "../victim".into();
    escape.timestamp = Utc::now() - Duration::days(400);
    std::fs::write(
        backups.join("backup-x.metadata.json"),
        serde_json::to_vec(&escape).unwrap(),
    )
    .unwrap();

    let mut alias = fresh.clone();
    alias.timestamp = Utc::now() - Duration::days(400);
    std::fs::write(
        backups.join("backup-y.metadata.json"),
        serde_json::to_vec(&alias).unwrap(),
    )
    .unwrap();

    assert_eq!(manager.list_backups().await.unwrap(), vec![fresh.clone()]);

    let report = manager.cleanup_old_backups().await.unwrap();
    assert!(report.deleted.is_empty());
    assert!(victim.exists());
    assert!(fresh.artifact_path(&backups).exists());
    assert!(fresh.sidecar_path(&backups).exists());

    assert!(matches!(
        manager.delete_backup("backup-x").await,
        Err(BackupError::MetadataIdMismatch { .. })
    ));
    assert!(victim.exists());
}

#[tokio::test]
async fn test_delete_backup() {
    let dir = tempfile::tempdir().unwrap();
    let db = FakeDatabase::with_contents(SAMPLE_SQL);
    let manager = manager(dir.path(), false, Some("k"), db);

    let meta = manager.create_backup().await.unwrap();
    manager.delete_backup(&meta.id).await.unwrap();
    assert!(file_names(dir.path()).is_empty());

    assert!(matches!(
        manager.delete_backup(&meta.id).await,
        Err(BackupError::MetadataNotFound(_))
    ));
}
