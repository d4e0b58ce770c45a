// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM response parsing.
//!
//! Models return attribution either as JSON (possibly fenced) or as
//! labelled plain text. Parsing is tolerant: anything unusable degrades
//! to an `unknown` module with the raw text carried as attribution lines,
//! never an error.

use crate::job::JobId;
use serde::{Deserialize, Serialize};

/// Auto-resume verdict marking a failure as terminal. Results carrying
/// this value trigger a notification.
pub const AUTO_RESUME_STOP: &str = "STOP - DONT RESTART IMMEDIATE";

/// Context handed to the compute hook alongside the file bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wl_restart: Option<u32>,
}

/// Structured fields recovered from a raw LLM response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedLlmResponse {
    pub module: String,
    pub attribution: Vec<String>,
    pub auto_resume: String,
    pub auto_resume_explanation: String,
}

impl ParsedLlmResponse {
    /// True when the verdict says the job must not be restarted.
    pub fn is_terminal_failure(&self) -> bool {
        self.auto_resume == AUTO_RESUME_STOP
    }
}

/// Parse a raw LLM response into structured fields.
///
/// Tries, in order: a fenced ```json block, the whole text as JSON, and
/// labelled plain-text lines. Falls back to module `unknown` with the
/// raw lines as attribution.
pub fn parse_llm_response(raw: &str) -> ParsedLlmResponse {
    if let Some(json) = extract_fenced_json(raw).or_else(|| as_json_object(raw)) {
        return from_json(&json);
    }
    from_labelled_text(raw)
}

fn extract_fenced_json(raw: &str) -> Option<serde_json::Value> {
    let start = raw.find("```")?;
    let body = &raw[start + 3..];
    // Skip an optional language tag on the fence line
    let body = body.split_once('\n').map(|(_, rest)| rest)?;
    let end = body.find("```")?;
    as_json_object(&body[..end])
}

fn as_json_object(text: &str) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    value.is_object().then_some(value)
}

fn from_json(value: &serde_json::Value) -> ParsedLlmResponse {
    let str_field = |keys: &[&str]| -> String {
        keys.iter()
            .find_map(|k| value.get(*k))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    // Attribution may be a string or a list of strings.
    let attribution = match value.get("attribution").or_else(|| value.get("result")) {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .collect(),
        _ => Vec::new(),
    };

    let module = {
        let m = str_field(&["module"]);
        if m.is_empty() {
            "unknown".to_string()
        } else {
            m
        }
    };

    ParsedLlmResponse {
        module,
        attribution,
        auto_resume: str_field(&["auto_resume"]),
        auto_resume_explanation: str_field(&["auto_resume_explanation"]),
    }
}

fn from_labelled_text(raw: &str) -> ParsedLlmResponse {
    let mut parsed = ParsedLlmResponse {
        module: "unknown".to_string(),
        ..Default::default()
    };

    let mut unlabelled = Vec::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = label_value(line, "module") {
            parsed.module = rest;
        } else if let Some(rest) = label_value(line, "attribution") {
            parsed.attribution.push(rest);
        } else if let Some(rest) = label_value(line, "auto_resume_explanation") {
            parsed.auto_resume_explanation = rest;
        } else if let Some(rest) = label_value(line, "auto_resume") {
            parsed.auto_resume = rest;
        } else {
            unlabelled.push(line.to_string());
        }
    }

    if parsed.attribution.is_empty() {
        parsed.attribution = unlabelled;
    }
    parsed
}

/// `"Module: dataloader"` → `Some("dataloader")`, case-insensitive label.
fn label_value(line: &str, label: &str) -> Option<String> {
    let (head, rest) = line.split_once(':')?;
    let head = head.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    (head == label).then(|| rest.trim().to_string())
}

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;
