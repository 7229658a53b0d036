//! # Pipeline Module
//!
//! Resizable pool of hash workers fed from one job queue.
//!
//! Each accepted task becomes exactly one job. Growing the pool spawns threads
//! immediately; shrinking lets surplus threads retire between jobs, so work in
//! flight is never interrupted. Shutdown closes the queue and joins every
//! thread; jobs still queued run to their first chunk boundary, observe the
//! cancel flag, and finish as canceled.

pub mod events;
pub mod worker;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{debug, info, warn};

use crate::constants::WORKER_IDLE_POLL;
use crate::task::HashTask;

use worker::{HashContext, run_task};

type Job = Arc<HashTask>;

pub struct Scheduler {
    ctx: Arc<HashContext>,
    tx: Mutex<Option<Sender<Job>>>,
    rx: Receiver<Job>,
    live: Arc<AtomicUsize>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    spawned: AtomicUsize,
}

impl Scheduler {
    /// Open the queue and spawn the configured number of workers.
    pub fn start(ctx: Arc<HashContext>) -> Self {
        let (tx, rx) = unbounded();
        let scheduler = Self {
            ctx,
            tx: Mutex::new(Some(tx)),
            rx,
            live: Arc::new(AtomicUsize::new(0)),
            handles: Mutex::new(Vec::new()),
            spawned: AtomicUsize::new(0),
        };
        let workers = scheduler.ctx.progress.worker_count();
        scheduler.resize(workers);
        scheduler
    }

    /// Clamp and apply a new pool size. Returns the size applied.
    pub fn resize(&self, n: usize) -> usize {
        let target = self.ctx.progress.set_worker_count(n);
        let mut handles = self.lock_handles();
        handles.retain(|handle| !handle.is_finished());

        let Some(rx) = self.lock_tx().as_ref().map(|_| self.rx.clone()) else {
            return target;
        };

        loop {
            let live = self.live.load(Ordering::Acquire);
            if live >= target {
                break;
            }
            if self
                .live
                .compare_exchange(live, live + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            match self.spawn_worker(rx.clone()) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    self.live.fetch_sub(1, Ordering::AcqRel);
                    warn!("failed to spawn hash worker: {err}");
                    break;
                }
            }
        }
        debug!(
            "pool resized to {target} ({} live)",
            self.live.load(Ordering::Acquire)
        );
        target
    }

    /// Queue one task. Returns `false` once the scheduler has shut down.
    pub fn submit(&self, task: Job) -> bool {
        self.lock_tx()
            .as_ref()
            .is_some_and(|tx| tx.send(task).is_ok())
    }

    /// Threads currently alive, including ones about to retire.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.lock_tx().is_none()
    }

    /// Cancel, close the queue, and join every worker. Safe to call twice.
    pub fn shutdown(&self) {
        self.ctx.progress.request_cancel();
        let Some(tx) = self.lock_tx().take() else {
            return;
        };
        drop(tx);

        let handles = std::mem::take(&mut *self.lock_handles());
        let count = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                warn!("hash worker panicked");
            }
        }
        info!("scheduler stopped; joined {count} workers");
    }

    fn spawn_worker(&self, rx: Receiver<Job>) -> std::io::Result<JoinHandle<()>> {
        let ctx = Arc::clone(&self.ctx);
        let live = Arc::clone(&self.live);
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        thread::Builder::new()
            .name(format!("hash-worker-{n}"))
            .spawn(move || worker_loop(&ctx, &rx, &live))
    }

    fn lock_tx(&self) -> MutexGuard<'_, Option<Sender<Job>>> {
        self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(ctx: &HashContext, rx: &Receiver<Job>, live: &AtomicUsize) {
    loop {
        if should_retire(live, ctx.progress.worker_count()) {
            return;
        }
        match rx.recv_timeout(WORKER_IDLE_POLL) {
            Ok(task) => run_task(ctx, &task),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                live.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        }
    }
}

/// Claim one retirement slot if the pool is above its target.
fn should_retire(live: &AtomicUsize, target: usize) -> bool {
    let current = live.load(Ordering::Acquire);
    current > target
        && live
            .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
}
