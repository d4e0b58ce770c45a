// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM compute adapter.
//!
//! The engine never talks to a model directly; it hands file bytes and a
//! small context to this trait and parses whatever text comes back. The
//! deadline is enforced by the caller, not the adapter.

use async_trait::async_trait;
use attr_core::ComputeContext;
use thiserror::Error;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{ComputeCall, FakeComputeAdapter};

/// Errors from the LLM backend
#[derive(Debug, Clone, Error)]
pub enum ComputeError {
    #[error("LLM backend error: {0}")]
    Backend(String),
    #[error("LLM backend unavailable: {0}")]
    Unavailable(String),
}

/// Adapter for LLM-based log analysis
#[async_trait]
pub trait ComputeAdapter: Clone + Send + Sync + 'static {
    /// Analyze one log file. Returns the raw model response text.
    async fn analyze(&self, log: &[u8], ctx: &ComputeContext) -> Result<String, ComputeError>;
}
