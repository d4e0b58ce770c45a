// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result posting adapter.
//!
//! Called once per successful analyze with the built dataflow record.
//! The engine provides no retry and no ordering between concurrent
//! posts; failures are counted, never surfaced to the analyze caller.

use crate::record::DataflowRecord;
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakePostAdapter;

/// Errors from posting operations
#[derive(Debug, Error)]
pub enum PostError {
    #[error("post failed: {0}")]
    Failed(String),
}

/// Adapter for posting analysis records to an external sink
#[async_trait]
pub trait PostAdapter: Clone + Send + Sync + 'static {
    /// Post one record under the given index.
    async fn post(&self, record: &DataflowRecord, index: &str) -> Result<(), PostError>;
}

/// Poster that logs records instead of sending them anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPostAdapter;

#[async_trait]
impl PostAdapter for NoOpPostAdapter {
    async fn post(&self, record: &DataflowRecord, index: &str) -> Result<(), PostError> {
        debug!(
            index,
            job_id = record.get("s_job_id").and_then(|v| v.as_str()),
            "dropping record (no poster configured)"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "post_tests.rs"]
mod tests;
