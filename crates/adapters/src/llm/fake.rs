// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake compute adapter for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ComputeAdapter, ComputeError};
use async_trait::async_trait;
use attr_core::ComputeContext;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Recorded call to FakeComputeAdapter
#[derive(Debug, Clone)]
pub struct ComputeCall {
    pub log_len: usize,
    pub ctx: ComputeContext,
}

/// Fake compute adapter for testing
///
/// Returns a configurable response after a configurable delay and
/// records all calls.
#[derive(Clone)]
pub struct FakeComputeAdapter {
    inner: Arc<Mutex<FakeComputeState>>,
}

struct FakeComputeState {
    response: String,
    delay: Option<Duration>,
    error: Option<ComputeError>,
    calls: Vec<ComputeCall>,
}

impl Default for FakeComputeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeComputeAdapter {
    /// Fake that instantly attributes everything to the dataloader.
    pub fn new() -> Self {
        Self::with_response(
            r#"{"module":"dataloader","attribution":["worker exited unexpectedly"],"auto_resume":"RESTART","auto_resume_explanation":"transient failure"}"#,
        )
    }

    pub fn with_response(response: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeComputeState {
                response: response.to_string(),
                delay: None,
                error: None,
                calls: Vec::new(),
            })),
        }
    }

    /// Replace the response returned by subsequent calls.
    pub fn set_response(&self, response: &str) {
        self.inner.lock().response = response.to_string();
    }

    /// Sleep this long before answering (virtual time under a paused
    /// runtime).
    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock().delay = Some(delay);
    }

    pub fn clear_delay(&self) {
        self.inner.lock().delay = None;
    }

    /// Fail subsequent calls with the given error.
    pub fn set_error(&self, error: ComputeError) {
        self.inner.lock().error = Some(error);
    }

    pub fn clear_error(&self) {
        self.inner.lock().error = None;
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ComputeCall> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }
}

#[async_trait]
impl ComputeAdapter for FakeComputeAdapter {
    async fn analyze(&self, log: &[u8], ctx: &ComputeContext) -> Result<String, ComputeError> {
        let (delay, outcome) = {
            let mut state = self.inner.lock();
            state.calls.push(ComputeCall {
                log_len: log.len(),
                ctx: ctx.clone(),
            });
            let outcome = match &state.error {
                Some(err) => Err(err.clone()),
                None => Ok(state.response.clone()),
            };
            (state.delay, outcome)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
