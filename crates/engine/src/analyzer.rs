// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine orchestration.
//!
//! Ties the gate, registry, trackers, and coalescer together under the
//! injected compute and sink adapters. Every operation returns errors as
//! values; poster and notifier failures are counted and never fail an
//! analyze call.

use crate::coalescer::{CoalescerStats, InflightInfo, RequestCoalescer};
use crate::file_gate::{FileGate, GatedFile};
use crate::registry::{job_key, JobRegistry, RegistryLimits};
use crate::splitlog::SplitlogTrackers;
use attr_adapters::{
    build_dataflow_record, failure_notification, ComputeAdapter, NotifyAdapter, PostAdapter,
    RecordMeta,
};
use attr_core::{
    extract_job_metadata, parse_llm_response, read_and_parse_slurm_output, AnalysisResult,
    AnalysisStatus, AnalyzeResponse, AnalyzerConfig, AnalyzerError, AnalyzerResult, Clock,
    ComputeContext, FilePreviewResult, Job, JobId, JobMode, ParsedLlmResponse,
    SplitlogAnalysisResult, SourceMeta, SubmitResult, SLURM_HEAD_BYTES,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Adapter dependencies injected at engine construction
pub struct EngineDeps<L, P, N> {
    pub llm: L,
    pub poster: P,
    pub notifier: N,
}

/// Posting and notification counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostStats {
    pub total: u64,
    pub ok: u64,
    pub failed: u64,
    pub notifications: u64,
}

/// Job counts by mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub single: usize,
    pub splitlog: usize,
    pub terminal: usize,
}

/// Full observability snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub requests: CoalescerStats,
    pub jobs: JobStats,
    pub posts: PostStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Fail,
}

/// Health classification derived from error rates and saturation.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: HealthStatus,
    pub details: serde_json::Value,
}

/// The analysis engine.
///
/// Generic over the LLM compute hook, the result poster, the notifier,
/// and the clock, mirroring how the adapters are injected in tests.
pub struct AnalysisEngine<L, P, N, C: Clock> {
    cfg: AnalyzerConfig,
    clock: C,
    gate: FileGate,
    coalescer: RequestCoalescer<C>,
    registry: JobRegistry<C>,
    trackers: SplitlogTrackers,
    llm: L,
    poster: P,
    notifier: N,
    post_stats: Mutex<PostStats>,
    shutdown_tx: watch::Sender<bool>,
}

impl<L, P, N, C> AnalysisEngine<L, P, N, C>
where
    L: ComputeAdapter,
    P: PostAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    /// Build an engine. The allowed root must exist.
    pub fn new(cfg: AnalyzerConfig, deps: EngineDeps<L, P, N>, clock: C) -> AnalyzerResult<Self> {
        cfg.validate()
            .map_err(|e| AnalyzerError::internal(e.to_string()))?;

        let gate = FileGate::new(
            &cfg.allowed_root,
            cfg.min_file_size_bytes(),
            cfg.fingerprint_mode,
        )?;
        let coalescer = RequestCoalescer::new(
            clock.clone(),
            std::time::Duration::from_secs(cfg.cache_ttl_seconds),
            cfg.cache_max_entries,
        );
        let registry = JobRegistry::new(
            clock.clone(),
            RegistryLimits {
                max_jobs: cfg.max_jobs,
                ttl_pending_ms: cfg.ttl_pending_ms(),
                ttl_terminated_ms: cfg.ttl_terminated_ms(),
                ttl_max_job_age_ms: cfg.ttl_max_job_age_ms(),
            },
        );
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            cfg,
            clock,
            gate,
            coalescer,
            registry,
            trackers: SplitlogTrackers::new(),
            llm: deps.llm,
            poster: deps.poster,
            notifier: deps.notifier,
            post_stats: Mutex::new(PostStats::default()),
            shutdown_tx,
        })
    }

    /// Restore cached results from the configured snapshot, if any.
    /// Read failures mean a cold start, never an error.
    pub fn load_snapshot(&self) -> usize {
        let Some(path) = &self.cfg.cache_snapshot_path else {
            return 0;
        };
        match attr_storage::read_snapshot(path) {
            Ok(Some(entries)) => {
                let restored = self.coalescer.restore(entries);
                if restored > 0 {
                    info!(restored, path = %path.display(), "restored cached results");
                }
                restored
            }
            Ok(None) => 0,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "cache snapshot unreadable, starting cold");
                0
            }
        }
    }

    /// Track a log file for analysis.
    ///
    /// With a job id and a `LOGS_DIR` directive in the file, the job
    /// enters splitlog mode and its cycle directory is scanned.
    /// Otherwise the job stays pending (subject to the pending TTL)
    /// until its first analyze settles the mode.
    pub fn submit(
        &self,
        log_path: &str,
        user: &str,
        job_id: Option<&str>,
    ) -> AnalyzerResult<SubmitResult> {
        let gated = self.gate.validate(log_path)?;
        let info = read_and_parse_slurm_output(&gated.path, SLURM_HEAD_BYTES)
            .map_err(|_| AnalyzerError::not_readable(log_path))?;

        let key = job_key(job_id, &gated.path);
        let explicit_id = job_id.is_some_and(|id| !id.is_empty());
        let job = self.registry.upsert(&key, user, &gated.path)?;

        if let (Some(dir), true) = (info.logs_dir, explicit_id) {
            self.trackers.attach(&key, &dir);
            let updated = self
                .registry
                .update(&key, |j| j.to_splitlog(dir.clone()))
                .unwrap_or(job);
            let counts = self.trackers.scan(&key, self.clock.epoch_ms())?;
            return Ok(SubmitResult {
                mode: JobMode::Splitlog,
                job_id: key,
                logs_dir: Some(dir),
                cycles_detected: Some(counts.total_files),
                cycles_analyzed: Some(updated.analyzed_cycles.len()),
            });
        }

        // No directive engaged: the job stays pending until its first
        // analyze settles the mode.
        Ok(SubmitResult {
            mode: job.mode,
            job_id: key,
            logs_dir: job.logs_dir,
            cycles_detected: None,
            cycles_analyzed: None,
        })
    }

    /// Analyze a log file, coalescing with concurrent requests for the
    /// same content.
    pub async fn analyze(
        &self,
        log_path: &str,
        file: Option<&str>,
        wl_restart: Option<u32>,
    ) -> AnalyzerResult<AnalyzeResponse> {
        let gated = self.gate.validate(log_path)?;
        let canonical = gated.path.to_string_lossy().into_owned();
        let now_ms = self.clock.epoch_ms();

        let job = match self.registry.find(&canonical) {
            Some(job) => {
                self.registry.update(&job.id, |j| j.touch(now_ms));
                job
            }
            None => self
                .registry
                .upsert(&JobId::new(canonical.clone()), "unknown", &gated.path)?,
        };

        // A pending job settles its mode here: splitlog if an explicit-id
        // job reveals a logs directory, single otherwise.
        let job = if job.mode == JobMode::Pending {
            let explicit_id = job.id.as_str() != canonical;
            let info = read_and_parse_slurm_output(&gated.path, SLURM_HEAD_BYTES)
                .map_err(|_| AnalyzerError::not_readable(log_path))?;
            match info.logs_dir {
                Some(dir) if explicit_id => {
                    self.trackers.attach(&job.id, &dir);
                    self.registry
                        .update(&job.id, |j| j.to_splitlog(dir))
                        .unwrap_or(job)
                }
                _ => self
                    .registry
                    .update(&job.id, |j| j.mode = JobMode::Single)
                    .unwrap_or(job),
            }
        } else {
            job
        };

        match job.mode {
            JobMode::Splitlog => self
                .analyze_splitlog(&job, file, wl_restart)
                .await
                .map(|r| AnalyzeResponse::Splitlog(Box::new(r))),
            _ => self
                .analyze_single(&job, &gated)
                .await
                .map(AnalyzeResponse::Single),
        }
    }

    async fn analyze_single(&self, job: &Job, gated: &GatedFile) -> AnalyzerResult<AnalysisResult> {
        let ctx = ComputeContext {
            job_id: scheduler_job_id(job).map(JobId::new),
            cycle: None,
            wl_restart: None,
        };
        let result = self.run_compute(gated, ctx).await?;
        self.postprocess(job, &gated.path, None, &result).await;
        Ok(result)
    }

    async fn analyze_splitlog(
        &self,
        job: &Job,
        file: Option<&str>,
        wl_restart: Option<u32>,
    ) -> AnalyzerResult<SplitlogAnalysisResult> {
        let now_ms = self.clock.epoch_ms();
        let counts = self.trackers.scan(&job.id, now_ms)?;
        let selected = self.trackers.select(&job.id, file)?;

        let gated = self.gate.validate(&selected.path.to_string_lossy())?;
        let file_name = selected.file_name();
        self.trackers
            .set_fingerprint(&job.id, &file_name, gated.fingerprint.clone());

        let ctx = ComputeContext {
            job_id: Some(job.id.clone()),
            cycle: selected.cycle,
            wl_restart,
        };
        let result = self.run_compute(&gated, ctx).await?;

        self.registry.update(&job.id, |j| {
            j.analyzed_cycles.insert(file_name);
            j.touch(now_ms);
        });
        self.postprocess(job, &gated.path, selected.cycle, &result).await;

        Ok(SplitlogAnalysisResult {
            mode: JobMode::Splitlog,
            sched_restarts: counts.sched_restarts,
            total_cycles: counts.total_files,
            cycle: selected.cycle,
            log_file: gated.path,
            wl_restart,
            result,
        })
    }

    /// Hand the file to the coalescer; the compute closure reads the
    /// bytes lazily so cache hits and joiners never touch the disk.
    async fn run_compute(
        &self,
        gated: &GatedFile,
        ctx: ComputeContext,
    ) -> AnalyzerResult<AnalysisResult> {
        let source = SourceMeta {
            job_id: ctx.job_id.clone(),
            path: gated.path.clone(),
            cycle: ctx.cycle,
        };
        let llm = self.llm.clone();
        let clock = self.clock.clone();
        let fingerprint = gated.fingerprint.clone();
        let target = gated.path.clone();

        self.coalescer
            .get_or_compute(
                &gated.fingerprint,
                source,
                ctx,
                self.cfg.compute_timeout(),
                move |ctx| async move {
                    let started_ms = clock.epoch_ms();
                    let bytes = tokio::fs::read(&target).await.map_err(|e| {
                        AnalyzerError::internal(format!(
                            "failed to read {}: {e}",
                            target.display()
                        ))
                        .with_details(serde_json::json!({"kind": "io"}))
                    })?;
                    let raw = llm.analyze(&bytes, &ctx).await.map_err(|e| {
                        AnalyzerError::internal(e.to_string())
                            .with_details(serde_json::json!({"kind": "llm"}))
                    })?;
                    let parsed = parse_llm_response(&raw);
                    Ok(AnalysisResult {
                        status: AnalysisStatus::Completed,
                        module: parsed.module,
                        result_id: fingerprint,
                        result: parsed.attribution,
                        auto_resume: parsed.auto_resume,
                        auto_resume_explanation: parsed.auto_resume_explanation,
                        processing_time_ms: clock.epoch_ms().saturating_sub(started_ms),
                    })
                },
            )
            .await
    }

    /// Post the record and, for terminal failures, notify. Failures on
    /// either sink are counted, never propagated.
    async fn postprocess(
        &self,
        job: &Job,
        analyzed_path: &Path,
        cycle: Option<u32>,
        result: &AnalysisResult,
    ) {
        let job_id = scheduler_job_id(job).unwrap_or_else(|| "unknown".to_string());
        let record = build_dataflow_record(
            result,
            &RecordMeta {
                job_id: &job_id,
                user: &job.user,
                log_path: analyzed_path,
                cluster: &self.cfg.cluster_name,
                cycle,
            },
        );

        self.post_stats.lock().total += 1;
        match self.poster.post(&record, &self.cfg.dataflow_index).await {
            Ok(()) => self.post_stats.lock().ok += 1,
            Err(e) => {
                warn!(error = %e, job_id = %job_id, "posting analysis record failed");
                self.post_stats.lock().failed += 1;
            }
        }

        let parsed = ParsedLlmResponse {
            module: result.module.clone(),
            attribution: result.result.clone(),
            auto_resume: result.auto_resume.clone(),
            auto_resume_explanation: result.auto_resume_explanation.clone(),
        };
        if parsed.is_terminal_failure() {
            let (title, body) = failure_notification(&job_id, &job.user, &parsed);
            match self.notifier.notify(&title, &body).await {
                Ok(()) => self.post_stats.lock().notifications += 1,
                Err(e) => warn!(error = %e, job_id = %job_id, "terminal-failure notification failed"),
            }
        }
    }

    /// First bytes of a gated file; size floor does not apply.
    pub fn preview(&self, log_path: &str) -> AnalyzerResult<FilePreviewResult> {
        self.gate.preview(log_path, self.cfg.preview_bytes)
    }

    pub fn stats(&self) -> EngineStats {
        let jobs = self.registry.all();
        let mut job_stats = JobStats {
            total: jobs.len(),
            ..Default::default()
        };
        for job in &jobs {
            match job.mode {
                JobMode::Pending => job_stats.pending += 1,
                JobMode::Single => job_stats.single += 1,
                JobMode::Splitlog => job_stats.splitlog += 1,
            }
            if job.is_terminal() {
                job_stats.terminal += 1;
            }
        }
        EngineStats {
            requests: self.coalescer.stats(),
            jobs: job_stats,
            posts: self.post_stats.lock().clone(),
        }
    }

    pub fn inflight(&self) -> Vec<InflightInfo> {
        self.coalescer.inflight()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.registry.all()
    }

    /// Mark a job terminal (exterior signal from the monitor).
    pub fn mark_terminal(&self, job_id: &str) -> bool {
        self.registry.mark_terminal(&JobId::new(job_id))
    }

    /// Health bands: any error rate at or past 50% fails, past 20%
    /// degrades, as does in-flight saturation at the cache bound.
    pub fn health(&self) -> Health {
        let stats = self.coalescer.stats();
        let posts = self.post_stats.lock().clone();

        let compute_error_rate = rate(stats.compute_errors, stats.computes);
        let post_failure_rate = rate(posts.failed, posts.total);
        let saturated = stats.in_flight >= self.cfg.cache_max_entries;

        let worst = compute_error_rate.max(post_failure_rate);
        let status = if worst >= 0.5 {
            HealthStatus::Fail
        } else if worst >= 0.2 || saturated {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        };

        let mut issues = Vec::new();
        if compute_error_rate >= 0.2 {
            issues.push(format!(
                "compute_error_rate={:.0}%",
                compute_error_rate * 100.0
            ));
        }
        if post_failure_rate >= 0.2 {
            issues.push(format!("post_failure_rate={:.0}%", post_failure_rate * 100.0));
        }
        if saturated {
            issues.push(format!("in_flight={}", stats.in_flight));
        }

        Health {
            status,
            details: serde_json::json!({
                "computes": stats.computes,
                "compute_errors": stats.compute_errors,
                "posts": posts.total,
                "post_failures": posts.failed,
                "in_flight": stats.in_flight,
                "issues": issues,
            }),
        }
    }

    /// One pass of the periodic sweep.
    pub fn sweep_once(&self) {
        self.registry.tick();
        self.trackers.retain(&self.registry.ids());
        self.coalescer.evict_by_age();
    }

    /// Flush the snapshot and stop the sweeper. Safe to call more than
    /// once; the write is best-effort.
    pub fn shutdown(&self) {
        if let Some(path) = &self.cfg.cache_snapshot_path {
            let entries = self.coalescer.entries();
            match attr_storage::write_snapshot(path, &entries) {
                Ok(()) => {
                    info!(count = entries.len(), path = %path.display(), "cache snapshot written")
                }
                Err(e) => warn!(error = %e, path = %path.display(), "cache snapshot write failed"),
            }
        }
        let _ = self.shutdown_tx.send(true);
    }

    /// Background TTL sweep at the configured poll interval, stopped by
    /// [`shutdown`](Self::shutdown).
    pub fn spawn_sweeper(engine: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut shutdown_rx = engine.shutdown_tx.subscribe();
        let period = engine.cfg.poll_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => engine.sweep_once(),
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

fn rate(errors: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        errors as f64 / total as f64
    }
}

/// The scheduler-side job id for records and notifications: the explicit
/// id when the job is id-keyed, otherwise whatever the filename reveals.
fn scheduler_job_id(job: &Job) -> Option<String> {
    let path_keyed = job.id.as_str() == job.log_path.to_string_lossy();
    if !path_keyed {
        return Some(job.id.as_str().to_string());
    }
    extract_job_metadata(&job.log_path)
}

#[cfg(test)]
#[path = "analyzer_tests.rs"]
mod tests;
