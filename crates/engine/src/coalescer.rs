// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request coalescing and result caching.
//!
//! At most one compute runs per fingerprint. Callers that arrive while a
//! compute is in flight attach to its slot and observe the same outcome;
//! completed results are cached with TTL and count bounds. The compute
//! itself runs in a detached task, so a caller disconnecting never
//! cancels work other waiters share.
//!
//! Lock discipline: one mutex guards the cache and in-flight maps, and
//! it is never held across an await. Each in-flight slot carries its own
//! outcome cell plus a `Notify` used as a one-shot broadcast.

use attr_core::{
    AnalysisResult, AnalyzerError, CacheEntry, Clock, ComputeContext, Fingerprint, SourceMeta,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Counter snapshot. Counters are monotone; the size fields are
/// point-in-time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoalescerStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced: u64,
    pub computes: u64,
    pub compute_errors: u64,
    pub cache_size: usize,
    pub in_flight: usize,
    pub evictions: u64,
}

/// One in-flight compute, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct InflightInfo {
    pub fingerprint: Fingerprint,
    pub started_at_ms: u64,
    pub waiters: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Rendezvous for requesters of one fingerprint.
struct InflightSlot {
    started_at_ms: u64,
    source: SourceMeta,
    /// Requesters currently attached, the runner included.
    waiters: AtomicUsize,
    notify: Notify,
    outcome: Mutex<Option<Result<AnalysisResult, AnalyzerError>>>,
}

impl InflightSlot {
    fn new(started_at_ms: u64, source: SourceMeta) -> Self {
        Self {
            started_at_ms,
            source,
            waiters: AtomicUsize::new(1),
            notify: Notify::new(),
            outcome: Mutex::new(None),
        }
    }
}

struct CoalescerState {
    cache: HashMap<Fingerprint, CacheEntry>,
    inflight: HashMap<Fingerprint, Arc<InflightSlot>>,
    cache_hits: u64,
    cache_misses: u64,
    coalesced: u64,
    computes: u64,
    compute_errors: u64,
    evictions: u64,
}

impl CoalescerState {
    fn new() -> Self {
        Self {
            cache: HashMap::new(),
            inflight: HashMap::new(),
            cache_hits: 0,
            cache_misses: 0,
            coalesced: 0,
            computes: 0,
            compute_errors: 0,
            evictions: 0,
        }
    }

    /// Drop entries past the TTL. Amortized across accesses; also driven
    /// by the periodic sweep.
    fn evict_expired(&mut self, now_ms: u64, ttl_ms: u64) {
        let before = self.cache.len();
        self.cache
            .retain(|_, e| now_ms.saturating_sub(e.created_at_ms) < ttl_ms);
        self.evictions += (before - self.cache.len()) as u64;
    }

    /// Enforce the count bound: evict oldest `created_at_ms`, ties
    /// broken by fingerprint order.
    fn evict_over_capacity(&mut self, max_entries: usize) {
        while self.cache.len() > max_entries {
            let victim = self
                .cache
                .values()
                .min_by(|a, b| {
                    a.created_at_ms
                        .cmp(&b.created_at_ms)
                        .then_with(|| a.fingerprint.cmp(&b.fingerprint))
                })
                .map(|e| e.fingerprint.clone());
            match victim {
                Some(fp) => {
                    self.cache.remove(&fp);
                    self.evictions += 1;
                }
                None => break,
            }
        }
    }
}

struct Inner<C: Clock> {
    clock: C,
    cache_ttl_ms: u64,
    max_entries: usize,
    state: Mutex<CoalescerState>,
}

/// Fingerprint-keyed coalescing cache.
///
/// Cheap to clone; clones share state (the compute task holds one).
pub struct RequestCoalescer<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for RequestCoalescer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

enum Action {
    Hit(AnalysisResult),
    Join(Arc<InflightSlot>),
    Run(Arc<InflightSlot>),
}

impl<C: Clock> RequestCoalescer<C> {
    pub fn new(clock: C, cache_ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                cache_ttl_ms: cache_ttl.as_millis() as u64,
                max_entries,
                state: Mutex::new(CoalescerState::new()),
            }),
        }
    }

    /// Return the cached result, join an in-flight compute, or start a
    /// new one. Exactly one `compute` invocation happens per fingerprint
    /// across all concurrent callers; everyone observes the same outcome.
    ///
    /// On timeout the in-flight resolves with a timeout error and no
    /// cache entry is created, so the next caller may retry. Failures
    /// are likewise never cached.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        source: SourceMeta,
        context: ComputeContext,
        timeout: Duration,
        compute: F,
    ) -> Result<AnalysisResult, AnalyzerError>
    where
        F: FnOnce(ComputeContext) -> Fut,
        Fut: Future<Output = Result<AnalysisResult, AnalyzerError>> + Send + 'static,
    {
        let now_ms = self.inner.clock.epoch_ms();
        let action = {
            let mut state = self.inner.state.lock();
            state.evict_expired(now_ms, self.inner.cache_ttl_ms);

            if let Some(entry) = state.cache.get(fingerprint) {
                let result = entry.result.clone();
                state.cache_hits += 1;
                Action::Hit(result)
            } else if let Some(slot) = state.inflight.get(fingerprint) {
                let slot = slot.clone();
                state.coalesced += 1;
                slot.waiters.fetch_add(1, Ordering::SeqCst);
                Action::Join(slot)
            } else {
                state.cache_misses += 1;
                state.computes += 1;
                let slot = Arc::new(InflightSlot::new(now_ms, source));
                state.inflight.insert(fingerprint.clone(), slot.clone());
                Action::Run(slot)
            }
        };

        match action {
            Action::Hit(result) => Ok(result),
            Action::Join(slot) => {
                debug!(fingerprint = fingerprint.short(12), "joining in-flight compute");
                wait_for_outcome(&slot).await
            }
            Action::Run(slot) => {
                let fut = compute(context);
                let this = self.clone();
                let fp = fingerprint.clone();
                tokio::spawn(async move {
                    let outcome = match tokio::time::timeout(timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(fingerprint = fp.short(12), "compute timed out, cancelling");
                            Err(AnalyzerError::timeout(timeout))
                        }
                    };
                    this.resolve(&fp, outcome);
                });
                wait_for_outcome(&slot).await
            }
        }
    }

    /// Install the outcome, retire the in-flight slot, and wake every
    /// waiter. Cache insertion and slot removal share one critical
    /// section, so no requester can observe the gap between them.
    fn resolve(&self, fingerprint: &Fingerprint, outcome: Result<AnalysisResult, AnalyzerError>) {
        let now_ms = self.inner.clock.epoch_ms();
        let mut state = self.inner.state.lock();
        let Some(slot) = state.inflight.remove(fingerprint) else {
            return;
        };

        match &outcome {
            Ok(result) => {
                let entry = CacheEntry {
                    fingerprint: fingerprint.clone(),
                    result: result.clone(),
                    created_at_ms: now_ms,
                    source: slot.source.clone(),
                };
                state.cache.insert(fingerprint.clone(), entry);
                state.evict_over_capacity(self.inner.max_entries);
            }
            Err(err) => {
                state.compute_errors += 1;
                debug!(
                    fingerprint = fingerprint.short(12),
                    error = %err,
                    "compute failed; leaving no cache entry"
                );
            }
        }

        *slot.outcome.lock() = Some(outcome);
        drop(state);
        slot.notify.notify_waiters();
    }

    /// Read-only cache lookup; never triggers a compute.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let now_ms = self.inner.clock.epoch_ms();
        let mut state = self.inner.state.lock();
        state.evict_expired(now_ms, self.inner.cache_ttl_ms);
        state.cache.get(fingerprint).cloned()
    }

    /// Drop entries past the TTL. Called by the periodic sweep.
    pub fn evict_by_age(&self) {
        let now_ms = self.inner.clock.epoch_ms();
        let mut state = self.inner.state.lock();
        state.evict_expired(now_ms, self.inner.cache_ttl_ms);
    }

    pub fn stats(&self) -> CoalescerStats {
        let state = self.inner.state.lock();
        CoalescerStats {
            cache_hits: state.cache_hits,
            cache_misses: state.cache_misses,
            coalesced: state.coalesced,
            computes: state.computes,
            compute_errors: state.compute_errors,
            cache_size: state.cache.len(),
            in_flight: state.inflight.len(),
            evictions: state.evictions,
        }
    }

    /// In-flight computes, for observability.
    pub fn inflight(&self) -> Vec<InflightInfo> {
        let state = self.inner.state.lock();
        let mut infos: Vec<_> = state
            .inflight
            .iter()
            .map(|(fp, slot)| InflightInfo {
                fingerprint: fp.clone(),
                started_at_ms: slot.started_at_ms,
                waiters: slot.waiters.load(Ordering::SeqCst),
                path: Some(slot.source.path.clone()),
            })
            .collect();
        infos.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        infos
    }

    /// Current cache contents, for snapshotting. Never includes
    /// in-flight work.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let state = self.inner.state.lock();
        let mut entries: Vec<_> = state.cache.values().cloned().collect();
        entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        entries
    }

    /// Restore entries from a snapshot. Entries already past the TTL are
    /// dropped; restored entries keep their original `created_at_ms`.
    /// Returns how many were kept.
    pub fn restore(&self, entries: Vec<CacheEntry>) -> usize {
        let now_ms = self.inner.clock.epoch_ms();
        let mut state = self.inner.state.lock();
        let mut kept = 0;
        for entry in entries {
            if now_ms.saturating_sub(entry.created_at_ms) >= self.inner.cache_ttl_ms {
                continue;
            }
            if state.inflight.contains_key(&entry.fingerprint) {
                continue;
            }
            state.cache.insert(entry.fingerprint.clone(), entry);
            kept += 1;
        }
        state.evict_over_capacity(self.inner.max_entries);
        kept
    }
}

/// Park until the slot resolves, then return its outcome.
///
/// The `Notified` future is enabled before the outcome check so a
/// notification landing between check and await cannot be lost.
async fn wait_for_outcome(slot: &InflightSlot) -> Result<AnalysisResult, AnalyzerError> {
    loop {
        let notified = slot.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(outcome) = slot.outcome.lock().clone() {
            slot.waiters.fetch_sub(1, Ordering::SeqCst);
            return outcome;
        }

        notified.await;
    }
}

#[cfg(test)]
#[path = "coalescer_tests.rs"]
mod tests;
