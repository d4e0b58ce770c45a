// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job and cycle-file records.
//!
//! A job is keyed by the scheduler job id when the submitter supplies one,
//! otherwise by the canonical path of its primary log. Mode starts
//! `pending` and settles to `single` or `splitlog` once the primary log
//! has been inspected.

use crate::result::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Identifier a job is tracked under: the scheduler job id when
    /// known, otherwise the canonical path of its primary log file.
    pub struct JobId;
}

/// Analysis mode of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Mode not yet determined (job id known, primary log still growing).
    Pending,
    /// Analysis consumes exactly the primary log file.
    Single,
    /// Output references a directory of per-cycle logs.
    Splitlog,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Pending => "pending",
            JobMode::Single => "single",
            JobMode::Splitlog => "splitlog",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tracked job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user: String,
    pub mode: JobMode,
    /// Primary log file (the scheduler stdout path as submitted).
    pub log_path: PathBuf,
    /// Cycle-log directory, present once a LOGS_DIR directive is parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,
    pub submitted_at_ms: u64,
    pub last_touch_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_at_ms: Option<u64>,
    /// Cycle filenames analyzed at least once.
    #[serde(default)]
    pub analyzed_cycles: BTreeSet<String>,
}

impl Job {
    pub fn new(id: JobId, user: impl Into<String>, log_path: PathBuf, now_ms: u64) -> Self {
        Self {
            id,
            user: user.into(),
            mode: JobMode::Pending,
            log_path,
            logs_dir: None,
            submitted_at_ms: now_ms,
            last_touch_ms: now_ms,
            terminal_at_ms: None,
            analyzed_cycles: BTreeSet::new(),
        }
    }

    /// Record activity on this job.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_touch_ms = now_ms;
    }

    /// Enter splitlog mode with the discovered cycle directory.
    pub fn to_splitlog(&mut self, logs_dir: PathBuf) {
        self.mode = JobMode::Splitlog;
        self.logs_dir = Some(logs_dir);
    }

    /// Mark terminal. Idempotent; the first terminal time wins.
    pub fn mark_terminal(&mut self, now_ms: u64) {
        if self.terminal_at_ms.is_none() {
            self.terminal_at_ms = Some(now_ms);
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_at_ms.is_some()
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.submitted_at_ms)
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_touch_ms)
    }
}

/// A discovered cycle-log file belonging to a splitlog job.
///
/// Identity attributes are fixed at discovery; only the fingerprint is
/// filled in later, when the file is first analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub job_id: JobId,
    pub path: PathBuf,
    /// Cycle ordinal embedded in the filename, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<u32>,
    /// Stable per-job index assigned at discovery; never reused.
    pub index: u32,
    pub discovered_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

impl FileInfo {
    /// Filename component, lossy for non-UTF-8 names.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
