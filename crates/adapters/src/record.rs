// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dataflow record construction.
//!
//! One record per successful analysis, flat string-keyed fields with an
//! `s_` prefix as the downstream indexer expects them.

use attr_core::AnalysisResult;
use serde_json::{json, Map, Value};
use std::path::Path;

/// A flat record posted to the dataflow sink.
pub type DataflowRecord = Map<String, Value>;

/// Job-side metadata accompanying one analysis result.
#[derive(Debug, Clone)]
pub struct RecordMeta<'a> {
    pub job_id: &'a str,
    pub user: &'a str,
    pub log_path: &'a Path,
    pub cluster: &'a str,
    pub cycle: Option<u32>,
}

/// Build the posted record from an analysis result and its job metadata.
pub fn build_dataflow_record(result: &AnalysisResult, meta: &RecordMeta<'_>) -> DataflowRecord {
    let mut record = Map::new();
    record.insert("s_job_id".to_string(), json!(meta.job_id));
    record.insert("s_user".to_string(), json!(meta.user));
    record.insert("s_cluster".to_string(), json!(meta.cluster));
    record.insert(
        "s_log_path".to_string(),
        json!(meta.log_path.to_string_lossy()),
    );
    record.insert("s_module".to_string(), json!(result.module));
    record.insert(
        "s_attribution".to_string(),
        json!(result.result.join(" | ")),
    );
    record.insert("s_auto_resume".to_string(), json!(result.auto_resume));
    record.insert(
        "s_auto_resume_explanation".to_string(),
        json!(result.auto_resume_explanation),
    );
    record.insert(
        "s_result_id".to_string(),
        json!(result.result_id.as_str()),
    );
    record.insert(
        "s_processing_time_ms".to_string(),
        json!(result.processing_time_ms),
    );
    if let Some(cycle) = meta.cycle {
        record.insert("s_cycle".to_string(), json!(cycle));
    }
    record
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
