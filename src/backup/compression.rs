//! Gzip stages of the backup pipeline.
//!
//! flate2 is synchronous, so both directions stream file-to-file on the
//! blocking pool.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::backup::error::BackupResult;

/// Gzip `src` into `dst`. Returns the compressed size.
pub async fn gzip_file(src: &Path, dst: &Path) -> BackupResult<u64> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    let size = tokio::task::spawn_blocking(move || gzip_blocking(&src, &dst)).await??;
    Ok(size)
}

/// Gunzip `src` into `dst`. Returns the decompressed size.
pub async fn gunzip_file(src: &Path, dst: &Path) -> BackupResult<u64> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    let size = tokio::task::spawn_blocking(move || gunzip_blocking(&src, &dst)).await??;
    Ok(size)
}

fn gzip_blocking(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(dst)?), Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

fn gunzip_blocking(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut decoder = MultiGzDecoder::new(BufReader::new(File::open(src)?));
    let mut writer = BufWriter::new(File::create(dst)?);
    let written = io::copy(&mut decoder, &mut writer)?;
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gzip_shrinks_repetitive_sql() {
        let dir = tempfile::tempdir().unwrap();
        let sql = dir.path().join("dump.sql");
        let gz = dir.path().join("dump.sql.gz");
        let out = dir.path().join("restored.sql");

        let body = "INSERT INTO customers (name) VALUES ('Acme');\n".repeat(2_000);
        tokio::fs::write(&sql, &body).await.unwrap();

        let compressed = gzip_file(&sql, &gz).await.unwrap();
        assert!(compressed < body.len() as u64 / 10);

        let restored = gunzip_file(&gz, &out).await.unwrap();
        assert_eq!(restored, body.len() as u64);
        assert_eq!(tokio::fs::read_to_string(&out).await.unwrap(), body);
    }

    #[tokio::test]
    async fn test_gunzip_rejects_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("plain.sql");
        tokio::fs::write(&src, b"SELECT 1;").await.unwrap();
        assert!(gunzip_file(&src, &dir.path().join("out.sql")).await.is_err());
    }
}
