//! Authenticated encryption of backup artifacts.
//!
//! AES-256-GCM with a key derived from the configured passphrase by
//! PBKDF2-HMAC-SHA256 over a random per-artifact salt. The plaintext is sealed
//! in 64 KiB frames so large dumps never sit in memory.
//!
//! # File layout
//! ```text
//! "CRMOPS01" (8) | salt (16) | nonce prefix (8)
//! frame*: ciphertext length u32 BE | last flag u8 | ciphertext + tag
//! ```
//! Frame `n` uses nonce `prefix ‖ n` (u32 BE) and the last flag as AAD, so
//! reordered, dropped or truncated frames fail authentication.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::num::NonZeroU32;
use std::path::Path;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::backup::error::{BackupError, BackupResult};

const MAGIC_LEN: usize = 8;
const MAGIC: &[u8; MAGIC_LEN] = b"CRMOPS01";
const SALT_LEN: usize = 16;
const PREFIX_LEN: usize = NONCE_LEN - 4;
const FRAME_PLAINTEXT: usize = 64 * 1024;
const KEY_LEN: usize = 32;
const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => panic!("iteration count must be non-zero"),
};

/// Encrypt `src` into `dst`. Returns the ciphertext size.
pub async fn encrypt_file(src: &Path, dst: &Path, passphrase: &str) -> BackupResult<u64> {
    let (src, dst, passphrase) = (src.to_path_buf(), dst.to_path_buf(), passphrase.to_string());
    tokio::task::spawn_blocking(move || encrypt_blocking(&src, &dst, &passphrase)).await?
}

/// Decrypt `src` into `dst`. Returns the plaintext size.
pub async fn decrypt_file(src: &Path, dst: &Path, passphrase: &str) -> BackupResult<u64> {
    let (src, dst, passphrase) = (src.to_path_buf(), dst.to_path_buf(), passphrase.to_string());
    tokio::task::spawn_blocking(move || decrypt_blocking(&src, &dst, &passphrase)).await?
}

fn derive_key(passphrase: &str, salt: &[u8]) -> BackupResult<LessSafeKey> {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        PBKDF2_ITERATIONS,
        salt,
        passphrase.as_bytes(),
        &mut key,
    );
    let unbound = UnboundKey::new(&AES_256_GCM, &key)
        .map_err(|_| BackupError::Encryption("failed to build AES-256-GCM key".into()))?;
    Ok(LessSafeKey::new(unbound))
}

fn frame_nonce(prefix: &[u8; PREFIX_LEN], counter: u32) -> Nonce {
    let mut bytes = [0u8; NONCE_LEN];
    bytes[..PREFIX_LEN].copy_from_slice(prefix);
    bytes[PREFIX_LEN..].copy_from_slice(&counter.to_be_bytes());
    Nonce::assume_unique_for_key(bytes)
}

/// Fill `buf` as far as the reader allows; a short count means EOF.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn encrypt_blocking(src: &Path, dst: &Path, passphrase: &str) -> BackupResult<u64> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    let mut prefix = [0u8; PREFIX_LEN];
    rng.fill(&mut salt)
        .and_then(|_| rng.fill(&mut prefix))
        .map_err(|_| BackupError::Encryption("system random source unavailable".into()))?;
    let key = derive_key(passphrase, &salt)?;

    let mut reader = BufReader::new(File::open(src)?);
    let mut writer = BufWriter::new(File::create(dst)?);
    writer.write_all(MAGIC)?;
    writer.write_all(&salt)?;
    writer.write_all(&prefix)?;

    let mut buf = vec![0u8; FRAME_PLAINTEXT];
    let mut counter: u32 = 0;
    loop {
        let n = read_up_to(&mut reader, &mut buf)?;
        // A short read ends the stream; an exact multiple gets an empty final frame.
        let last = n < FRAME_PLAINTEXT;
        let flag = [u8::from(last)];

        let mut frame = buf[..n].to_vec();
        key.seal_in_place_append_tag(frame_nonce(&prefix, counter), Aad::from(flag), &mut frame)
            .map_err(|_| BackupError::Encryption("seal failed".into()))?;

        writer.write_all(&(frame.len() as u32).to_be_bytes())?;
        writer.write_all(&flag)?;
        writer.write_all(&frame)?;

        if last {
            break;
        }
        counter = counter
            .checked_add(1)
            .ok_or_else(|| BackupError::Encryption("input too large".into()))?;
    }

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

fn decrypt_blocking(src: &Path, dst: &Path, passphrase: &str) -> BackupResult<u64> {
    let mut reader = BufReader::new(File::open(src)?);

    let mut header = [0u8; MAGIC_LEN + SALT_LEN + PREFIX_LEN];
    read_exact_or_truncated(&mut reader, &mut header)?;
    if &header[..MAGIC_LEN] != MAGIC {
        return Err(BackupError::Decryption("not an encrypted backup".into()));
    }
    let salt = &header[MAGIC_LEN..MAGIC_LEN + SALT_LEN];
    let mut prefix = [0u8; PREFIX_LEN];
    prefix.copy_from_slice(&header[MAGIC_LEN + SALT_LEN..]);
    let key = derive_key(passphrase, salt)?;

    let tag_len = AES_256_GCM.tag_len();
    let mut writer = BufWriter::new(File::create(dst)?);
    let mut written: u64 = 0;
    let mut counter: u32 = 0;

    loop {
        let mut frame_header = [0u8; 5];
        read_exact_or_truncated(&mut reader, &mut frame_header)?;
        let len = u32::from_be_bytes([frame_header[0], frame_header[1], frame_header[2], frame_header[3]]) as usize;
        let flag = frame_header[4];
        if len < tag_len || len > FRAME_PLAINTEXT + tag_len || flag > 1 {
            return Err(BackupError::Decryption(format!("corrupt frame {}", counter)));
        }

        let mut frame = vec![0u8; len];
        read_exact_or_truncated(&mut reader, &mut frame)?;
        let plaintext = key
            .open_in_place(frame_nonce(&prefix, counter), Aad::from([flag]), &mut frame)
            .map_err(|_| BackupError::Decryption("authentication failed: wrong key or tampered data".into()))?;
        writer.write_all(plaintext)?;
        written += plaintext.len() as u64;

        if flag == 1 {
            let mut probe = [0u8; 1];
            if reader.read(&mut probe)? != 0 {
                return Err(BackupError::Decryption("trailing data after final frame".into()));
            }
            break;
        }
        counter = counter
            .checked_add(1)
            .ok_or_else(|| BackupError::Decryption("frame counter overflow".into()))?;
    }

    writer.flush()?;
    Ok(written)
}

fn read_exact_or_truncated(reader: &mut impl Read, buf: &mut [u8]) -> BackupResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            BackupError::Decryption("truncated ciphertext".into())
        } else {
            BackupError::Io(e)
        }
    })
}
