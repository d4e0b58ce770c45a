// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job tracking with bounded capacity and TTL cleanup.
//!
//! Jobs are keyed by scheduler job id when the submitter supplies one,
//! otherwise by the canonical path of the primary log. Resubmitting a
//! known key only refreshes its activity time and never fails on the
//! capacity bound.

use attr_core::{AnalyzerError, AnalyzerResult, Clock, Job, JobId, JobMode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// TTLs and capacity applied by [`JobRegistry::tick`].
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    pub max_jobs: usize,
    pub ttl_pending_ms: u64,
    pub ttl_terminated_ms: u64,
    pub ttl_max_job_age_ms: u64,
}

/// The set of tracked jobs.
pub struct JobRegistry<C: Clock> {
    jobs: Mutex<HashMap<JobId, Job>>,
    clock: C,
    limits: RegistryLimits,
}

impl<C: Clock> JobRegistry<C> {
    pub fn new(clock: C, limits: RegistryLimits) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            clock,
            limits,
        }
    }

    /// Create a job or refresh an existing one.
    ///
    /// A new job is admitted only after trying to evict: terminal jobs
    /// oldest-first, then the longest-idle job. Updates to an existing
    /// key always succeed.
    pub fn upsert(&self, id: &JobId, user: &str, log_path: &Path) -> AnalyzerResult<Job> {
        let now_ms = self.clock.epoch_ms();
        let mut jobs = self.jobs.lock();

        if let Some(job) = jobs.get_mut(id) {
            job.touch(now_ms);
            if job.user == "unknown" && user != "unknown" {
                job.user = user.to_string();
            }
            return Ok(job.clone());
        }

        if jobs.len() >= self.limits.max_jobs && !evict_one(&mut jobs, now_ms) {
            return Err(AnalyzerError::job_limit_reached(self.limits.max_jobs));
        }

        let job = Job::new(id.clone(), user, log_path.to_path_buf(), now_ms);
        info!(job_id = %id, user, "tracking new job");
        jobs.insert(id.clone(), job.clone());
        Ok(job)
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.lock().get(id).cloned()
    }

    /// Find by job id, or by primary log path.
    ///
    /// Several jobs may share a log path (an id-keyed and a path-keyed
    /// submission of the same file); the most recently touched wins,
    /// ties broken by id so the choice never depends on map order.
    pub fn find(&self, key: &str) -> Option<Job> {
        let jobs = self.jobs.lock();
        if let Some(job) = jobs.get(key) {
            return Some(job.clone());
        }
        let path = Path::new(key);
        jobs.values()
            .filter(|j| j.log_path == path)
            .max_by(|a, b| {
                a.last_touch_ms
                    .cmp(&b.last_touch_ms)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .cloned()
    }

    /// Mutate a job under the registry lock. Returns the updated copy.
    pub fn update(&self, id: &JobId, f: impl FnOnce(&mut Job)) -> Option<Job> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(id)?;
        f(job);
        Some(job.clone())
    }

    /// Mark a job terminal (exterior signal).
    pub fn mark_terminal(&self, id: &JobId) -> bool {
        let now_ms = self.clock.epoch_ms();
        self.update(id, |job| job.mark_terminal(now_ms)).is_some()
    }

    pub fn all(&self) -> Vec<Job> {
        let mut jobs: Vec<_> = self.jobs.lock().values().cloned().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Job ids currently tracked; the sweeper uses this to drop
    /// trackers of evicted jobs.
    pub fn ids(&self) -> Vec<JobId> {
        self.jobs.lock().keys().cloned().collect()
    }

    /// TTL sweep. Infers terminality for long-idle jobs, then removes:
    /// pending jobs idle past the pending TTL, terminal jobs past the
    /// terminated TTL, and any job past the absolute age cap.
    /// Returns the removed job ids.
    pub fn tick(&self) -> Vec<JobId> {
        let now_ms = self.clock.epoch_ms();
        let limits = self.limits;
        let mut jobs = self.jobs.lock();

        // Age heuristic: a job idle past the terminated TTL is assumed
        // to have left the scheduler.
        for job in jobs.values_mut() {
            if !job.is_terminal() && job.idle_ms(now_ms) > limits.ttl_terminated_ms {
                debug!(job_id = %job.id, "inferring terminal state from idle age");
                job.mark_terminal(now_ms);
            }
        }

        let mut removed = Vec::new();
        jobs.retain(|id, job| {
            let expired = job.age_ms(now_ms) > limits.ttl_max_job_age_ms
                || (job.mode == JobMode::Pending
                    && !job.is_terminal()
                    && job.idle_ms(now_ms) > limits.ttl_pending_ms)
                || job
                    .terminal_at_ms
                    .is_some_and(|t| now_ms.saturating_sub(t) > limits.ttl_terminated_ms);
            if expired {
                removed.push(id.clone());
            }
            !expired
        });

        if !removed.is_empty() {
            info!(count = removed.len(), "removed expired jobs");
        }
        removed
    }
}

/// A non-terminal job must have been idle this long before the capacity
/// bound may evict it.
const MIN_EVICT_IDLE_MS: u64 = 60_000;

/// Evict one job to admit a new one: oldest terminal job first, then the
/// longest-idle job past the idle floor. Returns false when every job is
/// live and recently active.
fn evict_one(jobs: &mut HashMap<JobId, Job>, now_ms: u64) -> bool {
    let victim = jobs
        .values()
        .filter(|j| j.is_terminal() || j.idle_ms(now_ms) >= MIN_EVICT_IDLE_MS)
        .min_by_key(|j| (!j.is_terminal(), j.terminal_at_ms.unwrap_or(j.last_touch_ms)))
        .map(|j| j.id.clone());

    match victim {
        Some(id) => {
            debug!(job_id = %id, "evicting job for capacity");
            jobs.remove(&id);
            true
        }
        None => false,
    }
}

/// Derive the registry key for a submission: the explicit scheduler job
/// id when given, otherwise the canonical log path.
pub fn job_key(job_id: Option<&str>, canonical_path: &Path) -> JobId {
    match job_id {
        Some(id) if !id.is_empty() => JobId::new(id),
        _ => JobId::new(canonical_path.to_string_lossy().into_owned()),
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
