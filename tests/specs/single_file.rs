//! S1: single-file happy path.

use crate::prelude::*;
use attr_core::{AnalysisStatus, AnalyzeResponse, JobMode};

#[tokio::test]
async fn submit_then_analyze_then_cache_hit() {
    let h = harness();
    let path = h.write_log("slurm-1.out", "training started\n");

    // Submit: keyed by the canonical path, pending until first analyze
    let submit = h.engine.submit(&path, "alice", None).unwrap();
    assert_eq!(submit.mode, JobMode::Pending);
    assert_eq!(
        submit.job_id.as_str(),
        h.canonical(&path).to_string_lossy()
    );

    // Analyze: completed result whose id is the content fingerprint
    let response = h.engine.analyze(&path, None, None).await.unwrap();
    let AnalyzeResponse::Single(result) = response else {
        panic!("expected single-file result");
    };
    assert_eq!(result.status, AnalysisStatus::Completed);
    assert_eq!(result.module, "dataloader");
    assert_eq!(result.result_id.as_str().len(), 32);

    // The first analyze settled the job into single mode
    assert_eq!(h.engine.jobs()[0].mode, JobMode::Single);

    // A second analyze observes the same result id from the cache
    let again = h.engine.analyze(&path, None, None).await.unwrap();
    assert_eq!(again.result().result_id, result.result_id);

    let stats = h.engine.stats();
    assert_eq!(stats.requests.computes, 1);
    assert_eq!(stats.requests.cache_hits, 1);
    assert_eq!(h.llm.call_count(), 1);
}

#[tokio::test]
async fn identical_content_across_paths_shares_one_compute() {
    let h = harness();
    let a = h.write_log("slurm-1.out", "same content\n");
    let b = h.write_log("slurm-2.out", "same content\n");

    let first = h.engine.analyze(&a, None, None).await.unwrap();
    let second = h.engine.analyze(&b, None, None).await.unwrap();

    // Same bytes, same fingerprint: the second call is a cache hit
    assert_eq!(first.result().result_id, second.result().result_id);
    assert_eq!(h.engine.stats().requests.computes, 1);
    assert_eq!(h.engine.stats().requests.cache_hits, 1);
}

#[tokio::test]
async fn results_flow_to_the_poster() {
    let h = harness();
    let path = h.write_log("slurm-7.out", "");
    h.engine.submit(&path, "carol", None).unwrap();
    h.engine.analyze(&path, None, None).await.unwrap();

    let posts = h.poster.posts();
    assert_eq!(posts.len(), 1);
    let (record, _) = &posts[0];
    assert_eq!(record["s_user"], "carol");
    assert_eq!(record["s_job_id"], "7");
    assert_eq!(record["s_module"], "dataloader");
}
