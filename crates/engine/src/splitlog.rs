// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cycle-file discovery for splitlog jobs.
//!
//! A splitlog job writes one log per scheduler restart ("cycle") into
//! its logs directory. The tracker enumerates those files, orders them
//! by the cycle number embedded in the filename, and assigns each file
//! an index that stays stable across rescans for the lifetime of the
//! job. File contents are never read here; analysis reads them lazily.

use attr_core::{AnalyzerError, AnalyzerResult, FileInfo, Fingerprint, JobId};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Filter for analyzable files under a logs directory.
pub const CYCLE_LOG_PATTERN: &str = r"\.log$";

/// Extracts the cycle ordinal from a filename. Applied to the filename
/// only; the first capture group is the ordinal.
pub const CYCLE_NUM_PATTERN: &str = r"cycle[._-](\d+)";

/// Compile a pattern that is a valid literal.
#[allow(clippy::expect_used)]
fn compiled(pattern: &'static str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

fn cycle_log_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compiled(CYCLE_LOG_PATTERN))
}

fn cycle_num_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compiled(CYCLE_NUM_PATTERN))
}

fn extract_cycle(name: &str) -> Option<u32> {
    cycle_num_re()
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Counts reported in splitlog responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitlogCounts {
    /// Files carrying a cycle ordinal (scheduler restarts observed).
    pub sched_restarts: usize,
    pub total_files: usize,
}

/// Discovers and orders cycle files for one splitlog job.
#[derive(Debug)]
pub struct SplitlogTracker {
    job_id: JobId,
    logs_dir: PathBuf,
    /// Present files by filename.
    files: BTreeMap<String, FileInfo>,
    /// Indices of files that have disappeared; never reused.
    retired: HashMap<String, u32>,
    next_index: u32,
    last_scan_ms: u64,
}

impl SplitlogTracker {
    pub fn new(job_id: JobId, logs_dir: PathBuf) -> Self {
        Self {
            job_id,
            logs_dir,
            files: BTreeMap::new(),
            retired: HashMap::new(),
            next_index: 0,
            last_scan_ms: 0,
        }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Rescan the logs directory.
    ///
    /// Known files keep their index and discovery metadata. New files
    /// are indexed in (cycle, filename) order after everything already
    /// seen; files with no cycle number sort last, by name. A removed
    /// file's index is retired, and restored to the same file if it
    /// reappears.
    pub fn scan(&mut self, now_ms: u64) -> AnalyzerResult<SplitlogCounts> {
        let dir = std::fs::read_dir(&self.logs_dir)
            .map_err(|_| AnalyzerError::logs_dir_not_readable(&self.logs_dir.to_string_lossy()))?;

        let mut present: Vec<(String, PathBuf)> = Vec::new();
        for entry in dir.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !cycle_log_re().is_match(&name) {
                continue;
            }
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            present.push((name, entry.path()));
        }

        // Numbered cycles first in ascending order, then the rest by name.
        present.sort_by(|(a, _), (b, _)| {
            let ca = extract_cycle(a);
            let cb = extract_cycle(b);
            ca.is_none()
                .cmp(&cb.is_none())
                .then(ca.cmp(&cb))
                .then_with(|| a.cmp(b))
        });

        // Retire entries whose file disappeared.
        let present_names: std::collections::HashSet<&str> =
            present.iter().map(|(n, _)| n.as_str()).collect();
        let gone: Vec<String> = self
            .files
            .keys()
            .filter(|n| !present_names.contains(n.as_str()))
            .cloned()
            .collect();
        for name in gone {
            if let Some(info) = self.files.remove(&name) {
                debug!(job_id = %self.job_id, file = name, index = info.index, "cycle file disappeared");
                self.retired.insert(name, info.index);
            }
        }

        for (name, path) in present {
            if self.files.contains_key(&name) {
                continue;
            }
            // A reappearing file takes its old index back.
            let index = match self.retired.remove(&name) {
                Some(old) => old,
                None => {
                    let index = self.next_index;
                    self.next_index += 1;
                    index
                }
            };
            self.files.insert(
                name.clone(),
                FileInfo {
                    job_id: self.job_id.clone(),
                    path,
                    cycle: extract_cycle(&name),
                    index,
                    discovered_at_ms: now_ms,
                    fingerprint: None,
                },
            );
        }

        self.last_scan_ms = now_ms;
        Ok(self.count())
    }

    /// Select a cycle file: by filename when given, otherwise the latest
    /// cycle. `wl_restart` selects a workload restart within the file
    /// and is passed through to the compute context unchanged.
    pub fn select(&self, file: Option<&str>) -> AnalyzerResult<FileInfo> {
        match file {
            Some(name) => self
                .files
                .get(name)
                .cloned()
                .ok_or_else(|| AnalyzerError::not_found(name)),
            None => self
                .files
                .values()
                .max_by(|a, b| {
                    a.cycle
                        .is_some()
                        .cmp(&b.cycle.is_some())
                        .then(a.cycle.cmp(&b.cycle))
                        .then_with(|| a.file_name().cmp(&b.file_name()))
                })
                .cloned()
                .ok_or_else(|| AnalyzerError::not_found("no cycle files discovered")),
        }
    }

    pub fn count(&self) -> SplitlogCounts {
        SplitlogCounts {
            sched_restarts: self.files.values().filter(|f| f.cycle.is_some()).count(),
            total_files: self.files.len(),
        }
    }

    pub fn files(&self) -> Vec<FileInfo> {
        let mut files: Vec<_> = self.files.values().cloned().collect();
        files.sort_by_key(|f| f.index);
        files
    }

    /// Record the fingerprint computed for a cycle file.
    pub fn set_fingerprint(&mut self, file_name: &str, fingerprint: Fingerprint) {
        if let Some(info) = self.files.get_mut(file_name) {
            info.fingerprint = Some(fingerprint);
        }
    }
}

/// The per-job tracker set, behind its own mutex.
///
/// Trackers are keyed by job id; the owning job is looked up through
/// the registry, never through a back-pointer.
#[derive(Default)]
pub struct SplitlogTrackers {
    inner: Mutex<HashMap<JobId, SplitlogTracker>>,
}

impl SplitlogTrackers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a tracker for a job unless one already exists.
    pub fn attach(&self, job_id: &JobId, logs_dir: &Path) {
        let mut inner = self.inner.lock();
        inner
            .entry(job_id.clone())
            .or_insert_with(|| SplitlogTracker::new(job_id.clone(), logs_dir.to_path_buf()));
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.inner.lock().contains_key(job_id)
    }

    /// Rescan a job's logs directory.
    pub fn scan(&self, job_id: &JobId, now_ms: u64) -> AnalyzerResult<SplitlogCounts> {
        let mut inner = self.inner.lock();
        let tracker = inner
            .get_mut(job_id)
            .ok_or_else(|| AnalyzerError::not_found(job_id.as_str()))?;
        tracker.scan(now_ms)
    }

    /// Select a cycle file for analysis.
    pub fn select(&self, job_id: &JobId, file: Option<&str>) -> AnalyzerResult<FileInfo> {
        let inner = self.inner.lock();
        let tracker = inner
            .get(job_id)
            .ok_or_else(|| AnalyzerError::not_found(job_id.as_str()))?;
        tracker.select(file)
    }

    pub fn counts(&self, job_id: &JobId) -> Option<SplitlogCounts> {
        self.inner.lock().get(job_id).map(|t| t.count())
    }

    pub fn set_fingerprint(&self, job_id: &JobId, file_name: &str, fingerprint: Fingerprint) {
        if let Some(tracker) = self.inner.lock().get_mut(job_id) {
            tracker.set_fingerprint(file_name, fingerprint);
        }
    }

    /// Drop trackers whose job is no longer registered.
    pub fn retain(&self, live: &[JobId]) {
        let mut inner = self.inner.lock();
        inner.retain(|id, _| live.contains(id));
    }
}

#[cfg(test)]
#[path = "splitlog_tests.rs"]
mod tests;
