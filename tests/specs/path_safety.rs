//! S4 and the file-size boundary: nothing outside the allowed root is
//! ever reached, and the minimum-size gate is exact.

use crate::prelude::*;
use attr_core::ErrorCode;

#[tokio::test]
async fn dotdot_escape_is_rejected_with_no_side_effects() {
    let h = harness();
    let sneaky = format!("{}/../etc/passwd", h.root.path().display());

    let err = h.engine.analyze(&sneaky, None, None).await.unwrap_err();
    assert_eq!(err.error_code, ErrorCode::OutsideRoot);

    // No compute ran, no job was created
    assert_eq!(h.llm.call_count(), 0);
    assert!(h.engine.jobs().is_empty());
    assert_eq!(h.engine.stats().requests.computes, 0);
}

#[tokio::test]
async fn absolute_path_outside_root_is_rejected_everywhere() {
    let h = harness();

    let err = h.engine.submit("/etc/passwd", "eve", None).unwrap_err();
    assert_eq!(err.error_code, ErrorCode::OutsideRoot);

    let err = h.engine.preview("/etc/passwd").unwrap_err();
    assert_eq!(err.error_code, ErrorCode::OutsideRoot);

    let err = h.engine.analyze("/etc/passwd", None, None).await.unwrap_err();
    assert_eq!(err.error_code, ErrorCode::OutsideRoot);
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_escape_is_rejected() {
    let h = harness();
    let outside = tempfile::TempDir::new().unwrap();
    let target = outside.path().join("real.out");
    std::fs::write(&target, vec![b'x'; 2048]).unwrap();

    let link = h.root.path().join("escape.out");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let err = h
        .engine
        .analyze(&link.to_string_lossy(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code, ErrorCode::OutsideRoot);
}

#[test]
fn file_exactly_at_size_floor_is_accepted() {
    let h = harness();
    let path = h.write_sized("exact.out", 1024);
    assert!(h.engine.submit(&path, "alice", None).is_ok());
}

#[test]
fn file_one_byte_under_floor_is_empty_file() {
    let h = harness();
    let path = h.write_sized("short.out", 1023);
    let err = h.engine.submit(&path, "alice", None).unwrap_err();
    assert_eq!(err.error_code, ErrorCode::EmptyFile);
}

#[test]
fn preview_ignores_the_size_floor_but_not_the_root() {
    let h = harness();
    let path = h.write_sized("tiny.out", 10);

    let preview = h.engine.preview(&path).unwrap();
    assert_eq!(preview.content.len(), 10);
    assert!(!preview.truncated);
}

#[test]
fn preview_caps_at_configured_bytes() {
    let h = harness_with(|cfg| cfg.preview_bytes = 64);
    let path = h.write_sized("long.out", 4096);

    let preview = h.engine.preview(&path).unwrap();
    assert_eq!(preview.content.len(), 64);
    assert!(preview.truncated);
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let h = harness();
    let path = h.root.path().join("absent.out");
    let err = h
        .engine
        .analyze(&path.to_string_lossy(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code, ErrorCode::NotFound);
}
