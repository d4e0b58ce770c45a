// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake notify adapter for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{NotifyAdapter, NotifyError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Recorded call to FakeNotifyAdapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyCall {
    pub title: String,
    pub message: String,
}

/// Fake notify adapter that records every notification.
#[derive(Clone, Default)]
pub struct FakeNotifyAdapter {
    inner: Arc<Mutex<Vec<NotifyCall>>>,
}

impl FakeNotifyAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<NotifyCall> {
        self.inner.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().len()
    }
}

#[async_trait]
impl NotifyAdapter for FakeNotifyAdapter {
    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        self.inner.lock().push(NotifyCall {
            title: title.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}
