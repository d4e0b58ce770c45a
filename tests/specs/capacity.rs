//! Job-capacity boundaries: eviction preferences and idempotent
//! resubmission at the limit.

use crate::prelude::*;
use attr_core::ErrorCode;
use std::time::Duration;

#[test]
fn existing_job_id_succeeds_at_capacity() {
    let h = harness_with(|cfg| cfg.max_jobs = 3);
    for n in 0..3 {
        let path = h.write_log(&format!("slurm-{n}.out"), "");
        h.engine.submit(&path, "u", Some(&n.to_string())).unwrap();
    }

    // Resubmitting a tracked job never trips the limit
    let path = h.write_log("slurm-0.out", "");
    h.engine.submit(&path, "u", Some("0")).unwrap();
    assert_eq!(h.engine.jobs().len(), 3);
}

#[test]
fn new_job_triggers_eviction_of_terminal_first() {
    let h = harness_with(|cfg| cfg.max_jobs = 3);
    for n in 0..3 {
        let path = h.write_log(&format!("slurm-{n}.out"), "");
        h.engine.submit(&path, "u", Some(&n.to_string())).unwrap();
    }
    h.engine.mark_terminal("1");

    let path = h.write_log("slurm-9.out", "");
    h.engine.submit(&path, "u", Some("9")).unwrap();

    let ids: Vec<String> = h
        .engine
        .jobs()
        .into_iter()
        .map(|j| j.id.as_str().to_string())
        .collect();
    assert_eq!(h.engine.jobs().len(), 3);
    assert!(!ids.contains(&"1".to_string()));
    assert!(ids.contains(&"9".to_string()));
}

#[test]
fn all_jobs_fresh_and_live_is_job_limit_reached() {
    let h = harness_with(|cfg| cfg.max_jobs = 3);
    for n in 0..3 {
        let path = h.write_log(&format!("slurm-{n}.out"), "");
        h.engine.submit(&path, "u", Some(&n.to_string())).unwrap();
    }

    let path = h.write_log("slurm-9.out", "");
    let err = h.engine.submit(&path, "u", Some("9")).unwrap_err();
    assert_eq!(err.error_code, ErrorCode::JobLimitReached);

    // Once the oldest job has been idle long enough, the submit goes
    // through by evicting it.
    h.clock.advance(Duration::from_secs(120));
    h.engine.submit(&path, "u", Some("9")).unwrap();
    assert_eq!(h.engine.jobs().len(), 3);
}

#[tokio::test]
async fn duplicate_submits_share_one_job_and_one_cache_entry() {
    let h = harness();
    let path = h.write_log("slurm-1.out", "");

    let first = h.engine.submit(&path, "alice", Some("1")).unwrap();
    h.clock.advance(Duration::from_secs(5));
    let second = h.engine.submit(&path, "alice", Some("1")).unwrap();
    assert_eq!(first.job_id, second.job_id);
    assert_eq!(first.mode, second.mode);
    assert_eq!(h.engine.jobs().len(), 1);

    h.engine.analyze(&path, None, None).await.unwrap();
    h.engine.analyze(&path, None, None).await.unwrap();
    assert_eq!(h.engine.stats().requests.computes, 1);
}
