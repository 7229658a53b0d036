//! Shared helpers for engine integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;

use hashtool::digest::{DigestContext, DigestError};
use hashtool::{
    DigestKind, DigestProvider, EngineConfig, EngineEvent, HashEngine, StandardDigests,
};

pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Small chunks, two workers, unthrottled report.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        workers: 2,
        chunk_size_mib: 1,
        notify_interval_ms: 0,
        report_interval_ms: 0,
        event_capacity: 1024,
        ..EngineConfig::default()
    }
}

pub fn engine() -> (HashEngine, Receiver<EngineEvent>) {
    HashEngine::init(&test_config()).expect("engine")
}

/// Engine whose digests sleep `delay` per chunk, so tasks stay in flight.
pub fn slow_engine(delay: Duration) -> (HashEngine, Receiver<EngineEvent>) {
    HashEngine::init_with_provider(&test_config(), Arc::new(SlowDigests { delay }))
        .expect("engine")
}

pub fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    fs::write(&path, data).expect("write file");
    path
}

pub fn write_bytes(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).expect("write file");
    path
}

pub fn wait_idle(engine: &HashEngine) {
    assert!(engine.wait_idle(IDLE_TIMEOUT), "engine did not go idle");
}

/// Drain every event delivered so far.
pub fn drain(events: &Receiver<EngineEvent>) -> Vec<EngineEvent> {
    // Give workers a moment to flush their last notifications.
    thread::sleep(Duration::from_millis(20));
    events.try_iter().collect()
}

pub struct SlowDigests {
    pub delay: Duration,
}

impl DigestProvider for SlowDigests {
    fn name(&self) -> &str {
        "slow"
    }

    fn create(&self, kind: DigestKind) -> Result<Box<dyn DigestContext>, DigestError> {
        Ok(Box::new(SlowContext {
            inner: StandardDigests.create(kind)?,
            delay: self.delay,
        }))
    }
}

struct SlowContext {
    inner: Box<dyn DigestContext>,
    delay: Duration,
}

impl DigestContext for SlowContext {
    fn kind(&self) -> DigestKind {
        self.inner.kind()
    }

    fn update(&mut self, data: &[u8]) {
        thread::sleep(self.delay);
        self.inner.update(data);
    }

    fn finalize(self: Box<Self>) -> Result<Vec<u8>, DigestError> {
        self.inner.finalize()
    }
}
