// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler stdout parsing.
//!
//! The only structure the engine reads out of a scheduler log is the
//! `LOGS_DIR=<abs path>` directive a splitlog workload prints near the
//! top of its stdout, plus a job id recoverable from conventional
//! filenames like `slurm-12345.out`.

use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// How much of a scheduler log is inspected for directives.
pub const SLURM_HEAD_BYTES: usize = 64 * 1024;

/// Compile a pattern that is a valid literal.
#[allow(clippy::expect_used)]
fn compiled(pattern: &'static str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

fn logs_dir_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compiled(r"(?m)^\s*LOGS_DIR=(\S+)\s*$"))
}

fn job_id_directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compiled(r"(?m)^\s*SLURM_JOB_ID=(\d+)\s*$"))
}

/// Filename patterns a scheduler job id can be recovered from, tried in
/// order.
fn job_id_filename_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        vec![
            compiled(r"^slurm-(\d+)\.out$"),
            compiled(r"^slurm-(\d+)\.log$"),
            compiled(r"[._-](\d+)\.(?:out|log)$"),
        ]
    })
}

/// Directives recovered from a scheduler stdout file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlurmOutputInfo {
    /// Cycle-log directory, when the workload prints a LOGS_DIR directive.
    /// Relative values are ignored.
    pub logs_dir: Option<PathBuf>,
    /// Job id printed by the workload itself, if any.
    pub job_id_hint: Option<String>,
}

/// Scan scheduler stdout text for directives. First match wins.
pub fn parse_slurm_output(text: &str) -> SlurmOutputInfo {
    let logs_dir = logs_dir_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| PathBuf::from(m.as_str()))
        .filter(|p| p.is_absolute());

    let job_id_hint = job_id_directive_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    SlurmOutputInfo {
        logs_dir,
        job_id_hint,
    }
}

/// Read at most `max_bytes` of the file head and parse directives.
///
/// A partial read may split a UTF-8 sequence; the tail is decoded lossily
/// since directives are plain ASCII lines.
pub fn read_and_parse_slurm_output(
    path: &Path,
    max_bytes: usize,
) -> std::io::Result<SlurmOutputInfo> {
    let file = std::fs::File::open(path)?;
    let mut head = Vec::with_capacity(max_bytes.min(8 * 1024));
    file.take(max_bytes as u64).read_to_end(&mut head)?;
    Ok(parse_slurm_output(&String::from_utf8_lossy(&head)))
}

/// Recover a scheduler job id from a conventional log filename.
pub fn extract_job_metadata(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    job_id_filename_res()
        .iter()
        .find_map(|re| re.captures(name))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
#[path = "slurm_tests.rs"]
mod tests;
