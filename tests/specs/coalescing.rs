//! S2 and S6: coalescing under load, timeouts that do not poison.

use crate::prelude::*;
use attr_core::ErrorCode;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn fifty_concurrent_analyzes_share_one_compute() {
    let h = harness();
    let path = h.write_log("slurm-1.out", "contended file\n");
    h.llm.set_delay(Duration::from_millis(500));

    let engine = Arc::new(h.engine);
    let mut handles = Vec::new();
    for _ in 0..50 {
        let engine = engine.clone();
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            engine.analyze(&path, None, None).await
        }));
    }

    let mut result_ids = std::collections::HashSet::new();
    for handle in handles {
        let response = handle.await.unwrap().unwrap();
        result_ids.insert(response.result().result_id.clone());
    }
    // All 50 observed the same result value
    assert_eq!(result_ids.len(), 1);

    let stats = engine.stats();
    assert_eq!(stats.requests.computes, 1);
    assert_eq!(stats.requests.coalesced, 49);
    assert_eq!(stats.requests.cache_hits, 0);
    assert_eq!(h.llm.call_count(), 1);

    // A 51st call after completion is a cache hit
    engine.analyze(&path, None, None).await.unwrap();
    assert_eq!(engine.stats().requests.cache_hits, 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_resolves_all_waiters_and_does_not_poison() {
    let h = harness_with(|cfg| cfg.compute_timeout_seconds = 2);
    let path = h.write_log("slurm-1.out", "slow file\n");

    // The compute hangs far past the deadline
    h.llm.set_delay(Duration::from_secs(3600));

    let engine = Arc::new(h.engine);
    let mut handles = Vec::new();
    for _ in 0..5 {
        let engine = engine.clone();
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            engine.analyze(&path, None, None).await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InternalError);
        assert!(err.is_timeout());
    }

    // No cache entry was created
    assert_eq!(engine.stats().requests.cache_size, 0);
    assert_eq!(engine.stats().requests.in_flight, 0);

    // A fast compute right after succeeds and is cached
    h.llm.clear_delay();
    let response = engine.analyze(&path, None, None).await.unwrap();
    assert_eq!(response.result().status, attr_core::AnalysisStatus::Completed);
    assert_eq!(engine.stats().requests.cache_size, 1);
}

#[tokio::test(start_paused = true)]
async fn distinct_fingerprints_compute_independently() {
    let h = harness();
    let a = h.write_log("slurm-1.out", "first job\n");
    let b = h.write_log("slurm-2.out", "second job\n");
    h.llm.set_delay(Duration::from_millis(100));

    let engine = Arc::new(h.engine);
    let ta = {
        let engine = engine.clone();
        let a = a.clone();
        tokio::spawn(async move { engine.analyze(&a, None, None).await })
    };
    let tb = {
        let engine = engine.clone();
        let b = b.clone();
        tokio::spawn(async move { engine.analyze(&b, None, None).await })
    };

    let ra = ta.await.unwrap().unwrap();
    let rb = tb.await.unwrap().unwrap();
    assert_ne!(ra.result().result_id, rb.result().result_id);
    assert_eq!(engine.stats().requests.computes, 2);
    assert_eq!(engine.stats().requests.coalesced, 0);
}
