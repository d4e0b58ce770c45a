// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Success shapes returned by the engine, and the cached-entry record.

use crate::error::AnalyzerError;
use crate::job::{JobId, JobMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Content-derived identifier used as the coalescing key. Hex digest
    /// of the file bytes (or of path/size/mtime in stat mode).
    pub struct Fingerprint;
}

/// Result alias used across the engine: success shape or `AnalyzerError`.
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

/// Terminal state of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Completed,
    Timeout,
}

/// Attribution produced by one LLM analysis of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    /// Subsystem the failure is attributed to ("dataloader", "network", ...).
    pub module: String,
    /// Fingerprint of the analyzed file.
    pub result_id: Fingerprint,
    /// Attribution lines from the model.
    pub result: Vec<String>,
    pub auto_resume: String,
    pub auto_resume_explanation: String,
    pub processing_time_ms: u64,
}

/// Analysis response for one cycle file of a splitlog job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitlogAnalysisResult {
    pub mode: JobMode,
    /// Scheduler-level restarts observed (cycle files with an ordinal).
    pub sched_restarts: usize,
    pub total_cycles: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<u32>,
    /// The cycle file this result covers.
    pub log_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wl_restart: Option<u32>,
    pub result: AnalysisResult,
}

/// Response to a submit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub mode: JobMode,
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles_detected: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles_analyzed: Option<usize>,
}

/// First bytes of a gated file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePreviewResult {
    pub content: String,
    pub truncated: bool,
}

/// Union returned by analyze: single-file or splitlog shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalyzeResponse {
    Single(AnalysisResult),
    Splitlog(Box<SplitlogAnalysisResult>),
}

impl AnalyzeResponse {
    /// The inner analysis result, whichever shape this is.
    pub fn result(&self) -> &AnalysisResult {
        match self {
            AnalyzeResponse::Single(r) => r,
            AnalyzeResponse::Splitlog(s) => &s.result,
        }
    }
}

/// Where a cached result came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<u32>,
}

/// A completed analysis retained by fingerprint.
///
/// These records are what the cache snapshot persists; restored entries
/// keep their original `created_at_ms` for age accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub result: AnalysisResult,
    pub created_at_ms: u64,
    pub source: SourceMeta,
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
