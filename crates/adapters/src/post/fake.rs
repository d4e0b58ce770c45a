// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake posting adapter for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{PostAdapter, PostError};
use crate::record::DataflowRecord;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Fake posting adapter for testing
///
/// Records every posted record and can be scripted to fail.
#[derive(Clone, Default)]
pub struct FakePostAdapter {
    inner: Arc<Mutex<FakePostState>>,
}

#[derive(Default)]
struct FakePostState {
    posts: Vec<(DataflowRecord, String)>,
    fail_with: Option<String>,
}

impl FakePostAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail subsequent posts with the given message.
    pub fn set_failure(&self, message: &str) {
        self.inner.lock().fail_with = Some(message.to_string());
    }

    pub fn clear_failure(&self) {
        self.inner.lock().fail_with = None;
    }

    /// All posted (record, index) pairs, in order.
    pub fn posts(&self) -> Vec<(DataflowRecord, String)> {
        self.inner.lock().posts.clone()
    }

    pub fn post_count(&self) -> usize {
        self.inner.lock().posts.len()
    }
}

#[async_trait]
impl PostAdapter for FakePostAdapter {
    async fn post(&self, record: &DataflowRecord, index: &str) -> Result<(), PostError> {
        let mut state = self.inner.lock();
        state.posts.push((record.clone(), index.to_string()));
        match &state.fail_with {
            Some(msg) => Err(PostError::Failed(msg.clone())),
            None => Ok(()),
        }
    }
}
