//! Shared harness for the behavioral specs.

use attr_adapters::{FakeComputeAdapter, FakeNotifyAdapter, FakePostAdapter};
use attr_core::{AnalyzerConfig, FakeClock};
use attr_engine::{AnalysisEngine, EngineDeps};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub type TestEngine =
    AnalysisEngine<FakeComputeAdapter, FakePostAdapter, FakeNotifyAdapter, FakeClock>;

pub struct Harness {
    pub root: TempDir,
    pub engine: TestEngine,
    pub llm: FakeComputeAdapter,
    pub poster: FakePostAdapter,
    pub notifier: FakeNotifyAdapter,
    pub clock: FakeClock,
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(tweak: impl FnOnce(&mut AnalyzerConfig)) -> Harness {
    let root = TempDir::new().unwrap();
    let mut cfg = AnalyzerConfig::new(root.path());
    tweak(&mut cfg);

    let llm = FakeComputeAdapter::new();
    let poster = FakePostAdapter::new();
    let notifier = FakeNotifyAdapter::new();
    let clock = FakeClock::new();
    let engine = AnalysisEngine::new(
        cfg,
        EngineDeps {
            llm: llm.clone(),
            poster: poster.clone(),
            notifier: notifier.clone(),
        },
        clock.clone(),
    )
    .unwrap();

    Harness {
        root,
        engine,
        llm,
        poster,
        notifier,
        clock,
    }
}

impl Harness {
    /// Rebuild the engine against the same root (fresh state), keeping
    /// the fakes.
    pub fn restart_with(&self, tweak: impl FnOnce(&mut AnalyzerConfig)) -> TestEngine {
        let mut cfg = AnalyzerConfig::new(self.root.path());
        tweak(&mut cfg);
        AnalysisEngine::new(
            cfg,
            EngineDeps {
                llm: self.llm.clone(),
                poster: self.poster.clone(),
                notifier: self.notifier.clone(),
            },
            self.clock.clone(),
        )
        .unwrap()
    }

    /// Write a log file with the given head, padded past the 1 KiB size
    /// floor; returns its path as a string.
    pub fn write_log(&self, name: &str, head: &str) -> String {
        let path = self.root.path().join(name);
        let mut contents = head.to_string();
        contents.push_str(&"log filler line\n".repeat(100));
        fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    /// Write a file of an exact size in bytes.
    pub fn write_sized(&self, name: &str, len: usize) -> String {
        let path = self.root.path().join(name);
        fs::write(&path, vec![b'x'; len]).unwrap();
        path.to_string_lossy().into_owned()
    }

    /// Create a cycle-log directory under the root; returns its
    /// canonical path.
    pub fn write_cycle_dir(&self, name: &str, cycles: &[&str]) -> String {
        let dir = self.root.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        for cycle in cycles {
            fs::write(dir.join(cycle), "cycle output\n".repeat(100)).unwrap();
        }
        dir.canonicalize()
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }

    pub fn canonical(&self, path: &str) -> PathBuf {
        PathBuf::from(path).canonicalize().unwrap()
    }
}
