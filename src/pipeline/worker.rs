//! # Hash Worker
//!
//! Runs one task to completion on a pool thread. Every failure is recorded on
//! the task itself; nothing propagates back to the scheduler.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::digest::{DigestContext, DigestProvider, to_hex_upper};
use crate::notify::Notifier;
use crate::probe;
use crate::progress::ProgressAggregator;
use crate::registry::TaskRegistry;
use crate::report::ReportBuilder;
use crate::task::{HashTask, percent_of};

use super::events::EngineEvent;

/// Everything a worker touches, shared by the engine and every pool thread.
pub struct HashContext {
    pub registry: TaskRegistry,
    pub progress: ProgressAggregator,
    pub report: ReportBuilder,
    pub notifier: Notifier,
    pub provider: Arc<dyn DigestProvider>,
    pub chunk_size: usize,
    pub notify_interval: Duration,
    pub version_scan_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Hashed,
    Canceled,
    /// Could not open the file or create a context; the read loop never ran.
    Unopened,
    /// The read loop started but stopped on an I/O error.
    ReadFailed,
}

pub fn run_task(ctx: &HashContext, task: &HashTask) {
    let path = task.path();
    let stat = probe::stat(path);
    // Queued jobs drained by a cancel should reach the read loop without a scan.
    let version = if ctx.progress.cancel_requested() {
        None
    } else {
        probe::file_version(path, ctx.version_scan_limit)
    };
    task.begin(stat.modified, version);

    let file = File::open(path);
    let real_size = file
        .as_ref()
        .ok()
        .and_then(|f| f.metadata().ok())
        .map(|meta| meta.len())
        .unwrap_or_else(|| task.size_initial());
    let delta = ctx.registry.reconcile_size(task, real_size, &ctx.progress);
    if delta != 0 {
        debug!("{} size changed by {delta} bytes since enqueue", task.id());
    }

    let outcome = match file {
        Ok(file) => hash_file(ctx, task, file),
        Err(err) => {
            warn!("cannot open {}: {err}", path.display());
            Outcome::Unopened
        }
    };

    finish(ctx, task, outcome);
}

fn hash_file(ctx: &HashContext, task: &HashTask, mut file: File) -> Outcome {
    let mut contexts: Vec<Box<dyn DigestContext>> = Vec::new();
    for kind in task.digests().kinds() {
        match ctx.provider.create(kind) {
            Ok(digest) => contexts.push(digest),
            Err(err) => {
                warn!("{}: {err}", task.path().display());
                return Outcome::Unopened;
            }
        }
    }

    let mut buf = vec![0u8; ctx.chunk_size];
    let mut done: u64 = 0;
    let mut last_tick = Instant::now();
    task.set_bytes_done(0);

    let outcome = loop {
        if ctx.progress.cancel_requested() {
            task.mark_canceled();
            break Outcome::Canceled;
        }

        let n = match file.read(&mut buf) {
            Ok(0) => break Outcome::Hashed,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!("read failed for {}: {err}", task.path().display());
                break Outcome::ReadFailed;
            }
        };

        for digest in contexts.iter_mut() {
            digest.update(&buf[..n]);
        }
        done += n as u64;
        task.set_bytes_done(done);
        ctx.progress.add_done(n as u64);

        let now = Instant::now();
        if now.duration_since(last_tick) >= ctx.notify_interval {
            last_tick = now;
            let percent = percent_of(done, task.size_current());
            if task.note_percent(i64::from(percent)) {
                ctx.report.mark_dirty();
            }
            ctx.notifier.notify(EngineEvent::Progress);
        }
    };

    if outcome != Outcome::Canceled {
        settle_bytes(ctx, task);
    }

    if outcome == Outcome::Hashed {
        for digest in contexts {
            let kind = digest.kind();
            match digest.finalize() {
                Ok(raw) => task.set_result(kind, to_hex_upper(&raw)),
                Err(err) => warn!("{}: {err}", task.path().display()),
            }
        }
    }
    outcome
}

/// Bring the task to exactly its size: clamp an overshoot, and pad an
/// undershoot into both the task and the batch counters.
fn settle_bytes(ctx: &HashContext, task: &HashTask) {
    let done = task.raw_bytes_done();
    let size = task.size_current();
    if done >= size {
        task.set_bytes_done(size);
        return;
    }
    ctx.progress.add_done(size - done);
    task.set_bytes_done(size);
}

fn finish(ctx: &HashContext, task: &HashTask, outcome: Outcome) {
    task.mark_finished();
    ctx.progress.task_finished();
    ctx.report.mark_dirty();
    ctx.notifier.notify(EngineEvent::TaskFinished(task.id()));

    let view = task.view();
    debug!(
        "{} {} finished: {:?}, {} bytes in {:?}",
        task.id(),
        task.path().display(),
        outcome,
        view.bytes_done,
        view.elapsed.unwrap_or_default()
    );
}
