// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time source abstraction.
//!
//! Every TTL decision (cache age, job lifetimes, in-flight bookkeeping)
//! reads the clock through this trait so tests can drive time explicitly.

#[cfg(any(test, feature = "test-support"))]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(any(test, feature = "test-support"))]
use std::sync::Arc;
#[cfg(any(test, feature = "test-support"))]
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;
}

/// Production clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub struct FakeClock {
    now_ms: Arc<AtomicU64>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    /// Starts at a fixed, plausible epoch timestamp.
    pub fn new() -> Self {
        Self::at(1_700_000_000_000)
    }

    pub fn at(epoch_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(epoch_ms)),
        }
    }

    pub fn set(&self, epoch_ms: u64) {
        self.now_ms.store(epoch_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, by_ms: u64) {
        self.now_ms.fetch_add(by_ms, Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
