// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache snapshot persistence.
//!
//! Self-framed file: a magic line, then one length-prefixed JSON payload
//! per cache entry, then a zero-length sentinel followed by a SHA-256
//! digest over all record frames. The digest catches truncation from a
//! crash mid-write; atomic rename avoids it on clean shutdown. In-flight
//! work is never serialized.
//!
//! Layout:
//! ```text
//! "ATTR1\n"
//! u32-le len || JSON(CacheEntry)      (repeated)
//! u32-le 0   || 32-byte SHA-256
//! ```

use attr_core::CacheEntry;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Leading magic identifying a cache snapshot, format version 1.
pub const SNAPSHOT_MAGIC: &[u8; 6] = b"ATTR1\n";

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad magic (not a cache snapshot)")]
    BadMagic,
    #[error("truncated snapshot (missing trailer)")]
    Truncated,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("oversized record ({0} bytes)")]
    OversizedRecord(u32),
}

/// Upper bound on a single record frame; anything larger is corruption.
const MAX_RECORD_BYTES: u32 = 16 * 1024 * 1024;

/// Write all entries atomically (write to .tmp, then rename).
///
/// A crash during save leaves the previous snapshot intact.
pub fn write_snapshot(path: &Path, entries: &[CacheEntry]) -> Result<(), SnapshotError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");

    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        let mut hasher = Sha256::new();

        writer.write_all(SNAPSHOT_MAGIC)?;
        for entry in entries {
            let payload = serde_json::to_vec(entry)?;
            let len = (payload.len() as u32).to_le_bytes();
            hasher.update(len);
            hasher.update(&payload);
            writer.write_all(&len)?;
            writer.write_all(&payload)?;
        }
        writer.write_all(&0u32.to_le_bytes())?;
        writer.write_all(&hasher.finalize())?;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }

    // Atomic rename
    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Load a snapshot if it exists.
///
/// Returns `Ok(None)` if the file doesn't exist or is corrupt. Corrupt
/// snapshots are moved to a `.bak` file so a rewritten snapshot starts
/// clean; the engine treats either case as a cold start.
pub fn read_snapshot(path: &Path) -> Result<Option<Vec<CacheEntry>>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }

    match read_verified(path) {
        Ok(entries) => Ok(Some(entries)),
        Err(SnapshotError::Io(e)) => Err(SnapshotError::Io(e)),
        Err(e) => {
            let bak_path = rotate_bak_path(path);
            warn!(
                error = %e,
                path = %path.display(),
                bak = %bak_path.display(),
                "Corrupt cache snapshot, moving to .bak and starting cold",
            );
            fs::rename(path, &bak_path)?;
            Ok(None)
        }
    }
}

fn read_verified(path: &Path) -> Result<Vec<CacheEntry>, SnapshotError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; SNAPSHOT_MAGIC.len()];
    if reader.read_exact(&mut magic).is_err() || &magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic);
    }

    let mut entries = Vec::new();
    let mut hasher = Sha256::new();
    loop {
        let mut len_bytes = [0u8; 4];
        if reader.read_exact(&mut len_bytes).is_err() {
            return Err(SnapshotError::Truncated);
        }
        let len = u32::from_le_bytes(len_bytes);

        if len == 0 {
            // Trailer: digest over every record frame read so far.
            let mut stored = [0u8; 32];
            if reader.read_exact(&mut stored).is_err() {
                return Err(SnapshotError::Truncated);
            }
            if hasher.finalize().as_slice() != &stored[..] {
                return Err(SnapshotError::ChecksumMismatch);
            }
            return Ok(entries);
        }

        if len > MAX_RECORD_BYTES {
            return Err(SnapshotError::OversizedRecord(len));
        }

        let mut payload = vec![0u8; len as usize];
        if reader.read_exact(&mut payload).is_err() {
            return Err(SnapshotError::Truncated);
        }
        hasher.update(len_bytes);
        hasher.update(&payload);
        entries.push(serde_json::from_slice(&payload)?);
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    // Remove the oldest if at capacity
    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    // Shift existing backups up by one
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
