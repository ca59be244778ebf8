//! Scoped intermediate files.
//!
//! A [`ScratchFile`] removes its path when dropped unless it was kept, so
//! every exit path of a pipeline (including `?` and panics) cleans up.
//! Removal is best-effort: failures are logged, never raised.

use std::ops::Deref;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Disarm the guard and hand back the path; the file survives.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Deref for ScratchFile {
    type Target = Path;
    fn deref(&self) -> &Self::Target {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed intermediate file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove intermediate file"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_on_drop_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("dropped.sql");
        let kept = dir.path().join("kept.sql");
        std::fs::write(&dropped, b"x").unwrap();
        std::fs::write(&kept, b"y").unwrap();

        drop(ScratchFile::new(dropped.clone()));
        let path = ScratchFile::new(kept.clone()).keep();

        assert!(!dropped.exists());
        assert!(kept.exists());
        assert_eq!(path, kept);
    }

    #[test]
    fn test_missing_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        drop(ScratchFile::new(dir.path().join("never-created")));
    }
}
