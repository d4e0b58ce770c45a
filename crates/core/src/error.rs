// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error codes and the `AnalyzerError` value type.
//!
//! Errors cross component boundaries as values, never as panics. Every
//! operation on the engine returns either a success shape or an
//! `AnalyzerError`; infrastructure failures (snapshot IO, LLM backends)
//! are translated into `internal_error` at the engine boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Stable error codes surfaced to adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidPath,
    OutsideRoot,
    NotRegular,
    NotReadable,
    EmptyFile,
    NotFound,
    LogsDirNotReadable,
    JobLimitReached,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidPath => "invalid_path",
            ErrorCode::OutsideRoot => "outside_root",
            ErrorCode::NotRegular => "not_regular",
            ErrorCode::NotReadable => "not_readable",
            ErrorCode::EmptyFile => "empty_file",
            ErrorCode::NotFound => "not_found",
            ErrorCode::LogsDirNotReadable => "logs_dir_not_readable",
            ErrorCode::JobLimitReached => "job_limit_reached",
            ErrorCode::InternalError => "internal_error",
        }
    }

    /// HTTP status an adapter should map this code to.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidPath | ErrorCode::NotRegular | ErrorCode::EmptyFile => 400,
            ErrorCode::OutsideRoot | ErrorCode::NotReadable | ErrorCode::LogsDirNotReadable => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::JobLimitReached => 503,
            ErrorCode::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analysis error as a serializable value.
///
/// Never stored in the result cache; a failed compute leaves no entry
/// behind so the next caller may retry immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{error_code}: {message}")]
pub struct AnalyzerError {
    pub error_code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AnalyzerError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_path(path: &str) -> Self {
        Self::new(ErrorCode::InvalidPath, format!("invalid path: {path}"))
    }

    pub fn outside_root(path: &str) -> Self {
        Self::new(
            ErrorCode::OutsideRoot,
            format!("path is outside the allowed root: {path}"),
        )
    }

    pub fn not_regular(path: &str) -> Self {
        Self::new(ErrorCode::NotRegular, format!("not a regular file: {path}"))
    }

    pub fn not_readable(path: &str) -> Self {
        Self::new(ErrorCode::NotReadable, format!("file is not readable: {path}"))
    }

    pub fn empty_file(path: &str, size: u64, min: u64) -> Self {
        Self::new(
            ErrorCode::EmptyFile,
            format!("file is empty or below minimum size: {path} ({size} < {min} bytes)"),
        )
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("not found: {what}"))
    }

    pub fn logs_dir_not_readable(dir: &str) -> Self {
        Self::new(
            ErrorCode::LogsDirNotReadable,
            format!("logs directory is not readable: {dir}"),
        )
    }

    pub fn job_limit_reached(max: usize) -> Self {
        Self::new(
            ErrorCode::JobLimitReached,
            format!("job limit reached ({max} tracked jobs)"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Compute deadline exceeded. Carries a `kind:"timeout"` marker so
    /// callers can distinguish it from other internal errors.
    pub fn timeout(elapsed: Duration) -> Self {
        Self::new(
            ErrorCode::InternalError,
            format!("analysis timed out after {}s", elapsed.as_secs()),
        )
        .with_details(serde_json::json!({"kind": "timeout"}))
    }

    pub fn is_timeout(&self) -> bool {
        self.error_code == ErrorCode::InternalError
            && self
                .details
                .as_ref()
                .and_then(|d| d.get("kind"))
                .and_then(|k| k.as_str())
                == Some("timeout")
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
