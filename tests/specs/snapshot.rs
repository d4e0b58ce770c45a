//! S5: the cache survives a restart through the snapshot file.

use crate::prelude::*;

#[tokio::test]
async fn ten_entries_survive_restart_and_hit() {
    let snap_dir = tempfile::TempDir::new().unwrap();
    let snap_path = snap_dir.path().join("cache.snap");

    let h = harness_with(|cfg| cfg.cache_snapshot_path = Some(snap_path.clone()));
    let mut paths = Vec::new();
    for n in 0..10 {
        let path = h.write_log(&format!("slurm-{n}.out"), &format!("run {n}\n"));
        h.engine.analyze(&path, None, None).await.unwrap();
        paths.push(path);
    }
    assert_eq!(h.engine.stats().requests.cache_size, 10);

    h.engine.shutdown();
    assert!(snap_path.exists());

    // Fresh engine over the same snapshot
    let engine = h.restart_with(|cfg| cfg.cache_snapshot_path = Some(snap_path.clone()));
    assert_eq!(engine.load_snapshot(), 10);
    assert_eq!(engine.stats().requests.cache_size, 10);

    // Every fingerprint resolves from the cache, no compute
    let computes_before = h.llm.call_count();
    for path in &paths {
        engine.analyze(path, None, None).await.unwrap();
    }
    assert_eq!(engine.stats().requests.cache_hits, 10);
    assert_eq!(h.llm.call_count(), computes_before);
}

#[tokio::test]
async fn entries_past_ttl_are_dropped_on_restore() {
    let snap_dir = tempfile::TempDir::new().unwrap();
    let snap_path = snap_dir.path().join("cache.snap");

    let h = harness_with(|cfg| {
        cfg.cache_snapshot_path = Some(snap_path.clone());
        cfg.cache_ttl_seconds = 3600;
    });
    let fresh = h.write_log("slurm-1.out", "fresh\n");
    h.engine.analyze(&fresh, None, None).await.unwrap();

    h.clock.advance(std::time::Duration::from_secs(1800));
    let newer = h.write_log("slurm-2.out", "newer\n");
    h.engine.analyze(&newer, None, None).await.unwrap();

    h.engine.shutdown();

    // Another half hour later, only the newer entry is within TTL
    h.clock.advance(std::time::Duration::from_secs(1801));
    let engine = h.restart_with(|cfg| {
        cfg.cache_snapshot_path = Some(snap_path.clone());
        cfg.cache_ttl_seconds = 3600;
    });
    assert_eq!(engine.load_snapshot(), 1);
}

#[tokio::test]
async fn corrupt_snapshot_means_cold_start() {
    let snap_dir = tempfile::TempDir::new().unwrap();
    let snap_path = snap_dir.path().join("cache.snap");
    std::fs::write(&snap_path, b"definitely not a snapshot").unwrap();

    let h = harness_with(|cfg| cfg.cache_snapshot_path = Some(snap_path.clone()));
    assert_eq!(h.engine.load_snapshot(), 0);
    assert_eq!(h.engine.stats().requests.cache_size, 0);

    // The engine still works; shutdown rewrites a clean snapshot
    let path = h.write_log("slurm-1.out", "");
    h.engine.analyze(&path, None, None).await.unwrap();
    h.engine.shutdown();

    let engine = h.restart_with(|cfg| cfg.cache_snapshot_path = Some(snap_path.clone()));
    assert_eq!(engine.load_snapshot(), 1);
}

#[tokio::test]
async fn engine_without_snapshot_path_starts_cold() {
    let h = harness();
    assert_eq!(h.engine.load_snapshot(), 0);
    h.engine.shutdown(); // no snapshot configured; nothing written
}
