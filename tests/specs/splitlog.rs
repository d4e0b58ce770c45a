//! S3: splitlog discovery and per-cycle analysis.

use crate::prelude::*;
use attr_core::{AnalyzeResponse, ErrorCode, JobMode};

#[tokio::test]
async fn submit_discovers_cycles_and_analyze_selects_one() {
    let h = harness();
    let logs_dir = h.write_cycle_dir("j2", &["cycle_1.log", "cycle_2.log", "cycle_3.log"]);
    let path = h.write_log("slurm-2.out", &format!("LOGS_DIR={logs_dir}\n"));

    let submit = h.engine.submit(&path, "bob", Some("2")).unwrap();
    assert_eq!(submit.mode, JobMode::Splitlog);
    assert_eq!(submit.logs_dir.as_deref(), Some(std::path::Path::new(&logs_dir)));
    assert_eq!(submit.cycles_detected, Some(3));
    assert_eq!(submit.cycles_analyzed, Some(0));

    let response = h
        .engine
        .analyze(&path, Some("cycle_2.log"), None)
        .await
        .unwrap();
    let AnalyzeResponse::Splitlog(split) = response else {
        panic!("expected splitlog result");
    };
    assert_eq!(split.mode, JobMode::Splitlog);
    assert_eq!(split.sched_restarts, 3);
    assert_eq!(split.cycle, Some(2));
    assert!(split.log_file.ends_with("cycle_2.log"));

    // The analyzed-cycle count is visible on the next submit
    let resubmit = h.engine.submit(&path, "bob", Some("2")).unwrap();
    assert_eq!(resubmit.cycles_analyzed, Some(1));
}

#[tokio::test]
async fn new_cycles_appear_on_rescan() {
    let h = harness();
    let logs_dir = h.write_cycle_dir("j4", &["cycle_1.log"]);
    let path = h.write_log("slurm-4.out", &format!("LOGS_DIR={logs_dir}\n"));
    h.engine.submit(&path, "bob", Some("4")).unwrap();

    // The scheduler restarts the job; a new cycle file lands
    std::fs::write(
        std::path::Path::new(&logs_dir).join("cycle_2.log"),
        "cycle output\n".repeat(100),
    )
    .unwrap();

    let response = h.engine.analyze(&path, None, None).await.unwrap();
    let AnalyzeResponse::Splitlog(split) = response else {
        panic!("expected splitlog result");
    };
    // Analyze rescans: the latest cycle is the new file
    assert_eq!(split.total_cycles, 2);
    assert_eq!(split.cycle, Some(2));
}

#[tokio::test]
async fn each_cycle_is_cached_independently() {
    let h = harness();
    let logs_dir = h.write_cycle_dir("j5", &["cycle_1.log"]);
    // Distinct contents per cycle
    std::fs::write(
        std::path::Path::new(&logs_dir).join("cycle_2.log"),
        "different output\n".repeat(100),
    )
    .unwrap();
    let path = h.write_log("slurm-5.out", &format!("LOGS_DIR={logs_dir}\n"));
    h.engine.submit(&path, "bob", Some("5")).unwrap();

    let first = h.engine.analyze(&path, Some("cycle_1.log"), None).await.unwrap();
    let second = h.engine.analyze(&path, Some("cycle_2.log"), None).await.unwrap();
    assert_ne!(first.result().result_id, second.result().result_id);
    assert_eq!(h.engine.stats().requests.computes, 2);

    // Re-analyzing a cycle hits its cache entry
    h.engine.analyze(&path, Some("cycle_1.log"), None).await.unwrap();
    assert_eq!(h.engine.stats().requests.computes, 2);
    assert_eq!(h.engine.stats().requests.cache_hits, 1);
}

#[tokio::test]
async fn wl_restart_is_echoed_and_passed_to_compute() {
    let h = harness();
    let logs_dir = h.write_cycle_dir("j6", &["cycle_1.log"]);
    let path = h.write_log("slurm-6.out", &format!("LOGS_DIR={logs_dir}\n"));
    h.engine.submit(&path, "bob", Some("6")).unwrap();

    let response = h
        .engine
        .analyze(&path, Some("cycle_1.log"), Some(3))
        .await
        .unwrap();
    let AnalyzeResponse::Splitlog(split) = response else {
        panic!("expected splitlog result");
    };
    assert_eq!(split.wl_restart, Some(3));

    let calls = h.llm.calls();
    assert_eq!(calls[0].ctx.wl_restart, Some(3));
}

#[tokio::test]
async fn missing_cycle_file_is_not_found() {
    let h = harness();
    let logs_dir = h.write_cycle_dir("j7", &["cycle_1.log"]);
    let path = h.write_log("slurm-7.out", &format!("LOGS_DIR={logs_dir}\n"));
    h.engine.submit(&path, "bob", Some("7")).unwrap();

    let err = h
        .engine
        .analyze(&path, Some("cycle_99.log"), None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code, ErrorCode::NotFound);
}

#[tokio::test]
async fn deleted_logs_dir_surfaces_as_not_readable() {
    let h = harness();
    let logs_dir = h.write_cycle_dir("j8", &["cycle_1.log"]);
    let path = h.write_log("slurm-8.out", &format!("LOGS_DIR={logs_dir}\n"));
    h.engine.submit(&path, "bob", Some("8")).unwrap();

    std::fs::remove_dir_all(&logs_dir).unwrap();
    let err = h.engine.analyze(&path, None, None).await.unwrap_err();
    assert_eq!(err.error_code, ErrorCode::LogsDirNotReadable);
}
