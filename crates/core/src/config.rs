// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! Options load from a TOML file, with `ATTR_*` environment variables
//! taking precedence over file values. `allowed_root` is the only option
//! without a default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How file fingerprints are derived.
///
/// The two modes are never mixed within one process; a snapshot written
/// under one mode is only meaningful to an engine running the same mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// Streaming hash over file contents.
    #[default]
    Content,
    /// Hash over (path, size, mtime); cheaper for very large files.
    Stat,
}

/// Configuration for the analysis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Absolute directory every submitted path must resolve under.
    pub allowed_root: PathBuf,
    #[serde(default = "default_min_file_size_kb")]
    pub min_file_size_kb: u64,
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_ttl_pending_seconds")]
    pub ttl_pending_seconds: u64,
    #[serde(default = "default_ttl_terminated_seconds")]
    pub ttl_terminated_seconds: u64,
    #[serde(default = "default_ttl_max_job_age_seconds")]
    pub ttl_max_job_age_seconds: u64,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_compute_timeout_seconds")]
    pub compute_timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_snapshot_path: Option<PathBuf>,
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,
    #[serde(default = "default_dataflow_index")]
    pub dataflow_index: String,
    #[serde(default = "default_preview_bytes")]
    pub preview_bytes: usize,
    #[serde(default)]
    pub fingerprint_mode: FingerprintMode,
}

fn default_min_file_size_kb() -> u64 {
    1
}
fn default_max_jobs() -> usize {
    1024
}
fn default_cache_max_entries() -> usize {
    1024
}
fn default_cache_ttl_seconds() -> u64 {
    4 * 3600
}
fn default_ttl_pending_seconds() -> u64 {
    3600
}
fn default_ttl_terminated_seconds() -> u64 {
    24 * 3600
}
fn default_ttl_max_job_age_seconds() -> u64 {
    7 * 24 * 3600
}
fn default_poll_interval_seconds() -> u64 {
    60
}
fn default_compute_timeout_seconds() -> u64 {
    300
}
fn default_cluster_name() -> String {
    "unknown".to_string()
}
fn default_dataflow_index() -> String {
    "attribution".to_string()
}
fn default_preview_bytes() -> usize {
    4096
}

impl AnalyzerConfig {
    /// Config with defaults for everything but the allowed root.
    pub fn new(allowed_root: impl Into<PathBuf>) -> Self {
        Self {
            allowed_root: allowed_root.into(),
            min_file_size_kb: default_min_file_size_kb(),
            max_jobs: default_max_jobs(),
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            ttl_pending_seconds: default_ttl_pending_seconds(),
            ttl_terminated_seconds: default_ttl_terminated_seconds(),
            ttl_max_job_age_seconds: default_ttl_max_job_age_seconds(),
            poll_interval_seconds: default_poll_interval_seconds(),
            compute_timeout_seconds: default_compute_timeout_seconds(),
            cache_snapshot_path: None,
            cluster_name: default_cluster_name(),
            dataflow_index: default_dataflow_index(),
            preview_bytes: default_preview_bytes(),
            fingerprint_mode: FingerprintMode::default(),
        }
    }

    /// Load from a TOML file, then apply `ATTR_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut cfg: Self = toml::from_str(&text)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (tests inject a closure).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ATTR_ALLOWED_ROOT") {
            self.allowed_root = PathBuf::from(v);
        }
        set_parsed(&mut self.min_file_size_kb, &lookup, "ATTR_MIN_FILE_SIZE_KB");
        set_parsed(&mut self.max_jobs, &lookup, "ATTR_MAX_JOBS");
        set_parsed(&mut self.cache_max_entries, &lookup, "ATTR_CACHE_MAX_ENTRIES");
        set_parsed(&mut self.cache_ttl_seconds, &lookup, "ATTR_CACHE_TTL_SECONDS");
        set_parsed(&mut self.ttl_pending_seconds, &lookup, "ATTR_TTL_PENDING_SECONDS");
        set_parsed(
            &mut self.ttl_terminated_seconds,
            &lookup,
            "ATTR_TTL_TERMINATED_SECONDS",
        );
        set_parsed(
            &mut self.ttl_max_job_age_seconds,
            &lookup,
            "ATTR_TTL_MAX_JOB_AGE_SECONDS",
        );
        set_parsed(
            &mut self.poll_interval_seconds,
            &lookup,
            "ATTR_POLL_INTERVAL_SECONDS",
        );
        set_parsed(
            &mut self.compute_timeout_seconds,
            &lookup,
            "ATTR_COMPUTE_TIMEOUT_SECONDS",
        );
        if let Some(v) = lookup("ATTR_CACHE_SNAPSHOT_PATH") {
            self.cache_snapshot_path = if v.is_empty() {
                None
            } else {
                Some(PathBuf::from(v))
            };
        }
        if let Some(v) = lookup("ATTR_CLUSTER_NAME") {
            self.cluster_name = v;
        }
        if let Some(v) = lookup("ATTR_DATAFLOW_INDEX") {
            self.dataflow_index = v;
        }
        set_parsed(&mut self.preview_bytes, &lookup, "ATTR_PREVIEW_BYTES");
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.allowed_root.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "allowed_root must be absolute, got {}",
                self.allowed_root.display()
            )));
        }
        if self.max_jobs == 0 {
            return Err(ConfigError::Invalid("max_jobs must be nonzero".into()));
        }
        if self.cache_max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache_max_entries must be nonzero".into(),
            ));
        }
        if self.compute_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "compute_timeout_seconds must be nonzero".into(),
            ));
        }
        Ok(())
    }

    pub fn min_file_size_bytes(&self) -> u64 {
        self.min_file_size_kb * 1024
    }

    pub fn cache_ttl_ms(&self) -> u64 {
        self.cache_ttl_seconds * 1000
    }

    pub fn ttl_pending_ms(&self) -> u64 {
        self.ttl_pending_seconds * 1000
    }

    pub fn ttl_terminated_ms(&self) -> u64 {
        self.ttl_terminated_seconds * 1000
    }

    pub fn ttl_max_job_age_ms(&self) -> u64 {
        self.ttl_max_job_age_seconds * 1000
    }

    pub fn compute_timeout(&self) -> Duration {
        Duration::from_secs(self.compute_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

/// Overwrite `slot` with the parsed value of `key`, if present and parseable.
fn set_parsed<T: FromStr>(slot: &mut T, lookup: &impl Fn(&str) -> Option<String>, key: &str) {
    if let Some(parsed) = lookup(key).and_then(|v| v.parse().ok()) {
        *slot = parsed;
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
