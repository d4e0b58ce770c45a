// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! attr-storage: cache snapshot persistence

mod snapshot;

pub use snapshot::{read_snapshot, write_snapshot, SnapshotError, SNAPSHOT_MAGIC};
