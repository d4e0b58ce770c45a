// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path gating and content fingerprinting.
//!
//! Every file-referencing operation passes through here. Containment is
//! checked after symlink resolution, so a symlinked subdirectory cannot
//! escape the allowed root.

use attr_core::{
    AnalyzerError, AnalyzerResult, FilePreviewResult, FingerprintMode, Fingerprint,
};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

/// A validated file: canonical path, size, and coalescing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedFile {
    pub path: PathBuf,
    pub size: u64,
    pub fingerprint: Fingerprint,
}

/// Validates paths against the allowed root and produces fingerprints.
#[derive(Debug, Clone)]
pub struct FileGate {
    allowed_root: PathBuf,
    min_file_size_bytes: u64,
    mode: FingerprintMode,
}

impl FileGate {
    /// The allowed root must exist; it is canonicalized once here so
    /// containment checks compare resolved paths on both sides.
    pub fn new(
        allowed_root: &Path,
        min_file_size_bytes: u64,
        mode: FingerprintMode,
    ) -> AnalyzerResult<Self> {
        let allowed_root = allowed_root.canonicalize().map_err(|e| {
            AnalyzerError::internal(format!(
                "allowed root {} is not resolvable: {e}",
                allowed_root.display()
            ))
        })?;
        Ok(Self {
            allowed_root,
            min_file_size_bytes,
            mode,
        })
    }

    pub fn allowed_root(&self) -> &Path {
        &self.allowed_root
    }

    /// Validate a path and fingerprint its contents.
    ///
    /// Rejects paths outside the root, missing or non-regular files,
    /// unreadable files, and files below the minimum size.
    pub fn validate(&self, path: &str) -> AnalyzerResult<GatedFile> {
        let (resolved, size) = self.resolve(path)?;

        if size < self.min_file_size_bytes {
            debug!(path, size, min = self.min_file_size_bytes, "file below size floor");
            return Err(AnalyzerError::empty_file(path, size, self.min_file_size_bytes));
        }

        let fingerprint = self.fingerprint(&resolved, size)?;
        Ok(GatedFile {
            path: resolved,
            size,
            fingerprint,
        })
    }

    /// Read the first `n_bytes` of a gated file.
    ///
    /// Same validation as [`validate`](Self::validate) except the size
    /// floor: previews of short files are allowed.
    pub fn preview(&self, path: &str, n_bytes: usize) -> AnalyzerResult<FilePreviewResult> {
        let (resolved, size) = self.resolve(path)?;

        let mut head = Vec::with_capacity(n_bytes.min(64 * 1024));
        let file = File::open(&resolved)
            .map_err(|_| AnalyzerError::not_readable(path))?;
        file.take(n_bytes as u64)
            .read_to_end(&mut head)
            .map_err(|_| AnalyzerError::not_readable(path))?;

        Ok(FilePreviewResult {
            content: String::from_utf8_lossy(&head).into_owned(),
            truncated: size > n_bytes as u64,
        })
    }

    /// Resolve symlinks and check containment. Returns the canonical
    /// path and the file size.
    fn resolve(&self, path: &str) -> AnalyzerResult<(PathBuf, u64)> {
        if path.is_empty() || !Path::new(path).is_absolute() {
            return Err(AnalyzerError::invalid_path(path));
        }

        let resolved = Path::new(path).canonicalize().map_err(|e| {
            use std::io::ErrorKind;
            match e.kind() {
                ErrorKind::NotFound => AnalyzerError::not_found(path),
                ErrorKind::PermissionDenied => AnalyzerError::not_readable(path),
                _ => AnalyzerError::invalid_path(path),
            }
        })?;

        // Containment after symlink resolution; the root itself is not
        // an analyzable file.
        if !resolved.starts_with(&self.allowed_root) || resolved == self.allowed_root {
            debug!(path, resolved = %resolved.display(), "path escapes allowed root");
            return Err(AnalyzerError::outside_root(path));
        }

        let meta = std::fs::metadata(&resolved).map_err(|_| AnalyzerError::not_readable(path))?;
        if !meta.is_file() {
            return Err(AnalyzerError::not_regular(path));
        }

        Ok((resolved, meta.len()))
    }

    /// Fingerprint: first 128 bits of SHA-256, hex-encoded.
    ///
    /// Content mode streams the file; stat mode hashes (path, size,
    /// mtime) instead. The two are never mixed within one process.
    fn fingerprint(&self, path: &Path, size: u64) -> AnalyzerResult<Fingerprint> {
        let mut hasher = Sha256::new();

        match self.mode {
            FingerprintMode::Content => {
                let file = File::open(path)
                    .map_err(|_| AnalyzerError::not_readable(&path.to_string_lossy()))?;
                let mut reader = std::io::BufReader::new(file);
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let n = reader
                        .read(&mut buf)
                        .map_err(|_| AnalyzerError::not_readable(&path.to_string_lossy()))?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
            }
            FingerprintMode::Stat => {
                let meta = std::fs::metadata(path)
                    .map_err(|_| AnalyzerError::not_readable(&path.to_string_lossy()))?;
                let mtime_ms = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                hasher.update(path.to_string_lossy().as_bytes());
                hasher.update(size.to_le_bytes());
                hasher.update(mtime_ms.to_le_bytes());
            }
        }

        let digest = hasher.finalize();
        let hex: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
        Ok(Fingerprint::new(hex))
    }
}

#[cfg(test)]
#[path = "file_gate_tests.rs"]
mod tests;
