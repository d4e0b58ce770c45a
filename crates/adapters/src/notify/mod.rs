// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification adapter.
//!
//! The engine raises a notification only for terminal failures, i.e.
//! results whose auto-resume verdict says the job must not be restarted.

use async_trait::async_trait;
use attr_core::ParsedLlmResponse;
use thiserror::Error;
use tracing::debug;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifyAdapter, NotifyCall};

/// Errors from notify operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Adapter for sending notifications
#[async_trait]
pub trait NotifyAdapter: Clone + Send + Sync + 'static {
    /// Send a notification with a title and message body
    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError>;
}

/// Notifier that drops everything (notifications disabled).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifyAdapter;

#[async_trait]
impl NotifyAdapter for NoOpNotifyAdapter {
    async fn notify(&self, title: &str, _message: &str) -> Result<(), NotifyError> {
        debug!(title, "dropping notification (no notifier configured)");
        Ok(())
    }
}

/// Build the (title, body) pair for a terminal-failure notification.
pub fn failure_notification(job_id: &str, user: &str, parsed: &ParsedLlmResponse) -> (String, String) {
    let title = format!("Job {job_id} failed terminally");
    let attribution = if parsed.attribution.is_empty() {
        "No attribution available".to_string()
    } else {
        parsed.attribution.join(" | ")
    };
    let explanation = if parsed.auto_resume_explanation.is_empty() {
        "No explanation available"
    } else {
        &parsed.auto_resume_explanation
    };
    let body = format!(
        "Job ID: {job_id}\nUser: {user}\nFailed due to: {attribution}\nTerminal issue: {explanation}"
    );
    (title, body)
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
