//! # Progress Aggregator
//!
//! Process-wide byte accounting for the current batch.
//!
//! Per-chunk increments of `done_bytes` are lock-free. Every other write that
//! relates `total_bytes` to `done_bytes` (batch reset, batch extension, adding
//! a file, dispatch-time size reconciliation) is performed by callers holding
//! the registry lock, so those updates never interleave. Reads clamp, since the
//! two counters are loaded independently.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::clamp_workers;
use crate::constants::{MIB, MIN_ELAPSED};
use crate::task::percent_of;

/// Aggregate view handed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub percent: u8,
    pub total_bytes: u64,
    pub done_bytes: u64,
    pub mbps: f64,
    pub running_count: usize,
    pub pool_threads: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct ProgressAggregator {
    total_bytes: AtomicI64,
    done_bytes: AtomicI64,
    running: AtomicUsize,
    cancel: AtomicBool,
    worker_count: AtomicUsize,
    batch_start: Mutex<Option<Instant>>,
}

impl ProgressAggregator {
    pub fn new(worker_count: usize) -> Self {
        Self {
            total_bytes: AtomicI64::new(0),
            done_bytes: AtomicI64::new(0),
            running: AtomicUsize::new(0),
            cancel: AtomicBool::new(false),
            worker_count: AtomicUsize::new(clamp_workers(worker_count)),
            batch_start: Mutex::new(None),
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed).max(0) as u64
    }

    /// Done bytes, never reported above the total.
    pub fn done_bytes(&self) -> u64 {
        let total = self.total_bytes.load(Ordering::Relaxed);
        let done = self.done_bytes.load(Ordering::Relaxed);
        done.min(total).max(0) as u64
    }

    pub fn add_total(&self, delta: i64) {
        self.total_bytes.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn add_done(&self, delta: u64) {
        self.done_bytes.fetch_add(delta as i64, Ordering::Relaxed);
    }

    /// Start a fresh batch: both counters zeroed, clock restarted.
    pub fn reset_batch(&self) {
        self.done_bytes.store(0, Ordering::Relaxed);
        self.total_bytes.store(0, Ordering::Relaxed);
        *self.lock_start() = Some(Instant::now());
    }

    /// Treat everything accounted so far as complete.
    pub fn settle(&self) {
        let total = self.total_bytes.load(Ordering::Relaxed);
        self.done_bytes.store(total, Ordering::Relaxed);
    }

    /// Zero everything, including the cancel flag and the batch clock.
    pub fn clear(&self) {
        self.done_bytes.store(0, Ordering::Relaxed);
        self.total_bytes.store(0, Ordering::Relaxed);
        self.cancel.store(false, Ordering::Release);
        *self.lock_start() = None;
    }

    pub fn ensure_started(&self) {
        self.lock_start().get_or_insert_with(Instant::now);
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    pub fn task_started(&self) {
        self.running.fetch_add(1, Ordering::AcqRel);
    }

    pub fn task_finished(&self) {
        // Saturate instead of wrapping if a finish is ever unmatched.
        let _ = self
            .running
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn clear_cancel(&self) {
        self.cancel.store(false, Ordering::Release);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::Relaxed)
    }

    /// Store a clamped pool size and return it.
    pub fn set_worker_count(&self, n: usize) -> usize {
        let n = clamp_workers(n);
        self.worker_count.store(n, Ordering::Relaxed);
        n
    }

    pub fn elapsed(&self) -> Duration {
        let start = *self.lock_start();
        start
            .map(|start| start.elapsed())
            .unwrap_or_default()
            .max(MIN_ELAPSED)
    }

    pub fn summary(&self) -> Summary {
        let total = self.total_bytes();
        let done = self.done_bytes();
        let elapsed = self.elapsed();
        Summary {
            percent: percent_of(done, total),
            total_bytes: total,
            done_bytes: done,
            mbps: done as f64 / MIB as f64 / elapsed.as_secs_f64(),
            running_count: self.running(),
            pool_threads: self.worker_count(),
            elapsed,
        }
    }

    fn lock_start(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.batch_start
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
