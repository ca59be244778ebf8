//! SHA-256 of backup artifacts.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::backup::error::BackupResult;

const READ_BUFFER: usize = 64 * 1024;

/// Stream `path` through SHA-256 and return the lowercase hex digest.
pub async fn sha256_file(path: &Path) -> BackupResult<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
