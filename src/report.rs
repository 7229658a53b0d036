//! # Report Builder
//!
//! Renders every task into one human-readable text. Rebuilds are driven by a
//! shared dirty flag and throttled; the text is written into a back buffer and
//! swapped in only when complete, so a failed rebuild leaves the previous text
//! visible. Both buffers are reused across rebuilds.

use std::collections::TryReserveError;
use std::fmt::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::constants::{
    GIB, KIB, MIB, MIN_ELAPSED, REPORT_BYTES_PER_TASK, REPORT_GROWTH_BASE, REPORT_GROWTH_CAP,
    REPORT_GROWTH_SLACK,
};
use crate::digest::DigestKind;
use crate::task::TaskView;

const SEPARATOR: &str = "──────────────────────────────────────";
const MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default)]
struct Buffers {
    front: String,
    back: String,
    last_attempt: Option<Instant>,
}

#[derive(Debug)]
pub struct ReportBuilder {
    dirty: AtomicBool,
    interval: Duration,
    buffers: Mutex<Buffers>,
}

impl ReportBuilder {
    pub fn new(interval: Duration, initial_bytes: usize) -> Self {
        let mut buffers = Buffers::default();
        if let Err(err) = buffers.front.try_reserve_exact(initial_bytes) {
            warn!("report buffer reservation failed: {err}");
        }
        Self {
            dirty: AtomicBool::new(true),
            interval,
            buffers: Mutex::new(buffers),
        }
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Rebuild from `snapshot` if forced, or if the throttle window has passed
    /// and the text is dirty. `snapshot` is only called when a rebuild happens.
    /// Returns whether the visible text was replaced.
    pub fn refresh<F>(&self, force: bool, snapshot: F) -> bool
    where
        F: FnOnce() -> Vec<TaskView>,
    {
        let mut buffers = self.lock();
        let now = Instant::now();
        if !force
            && buffers
                .last_attempt
                .is_some_and(|last| now.duration_since(last) < self.interval)
        {
            return false;
        }
        buffers.last_attempt = Some(now);

        if !self.dirty.swap(false, Ordering::AcqRel) && !force {
            return false;
        }

        let tasks = snapshot();
        let Buffers { front, back, .. } = &mut *buffers;
        back.clear();
        let need = tasks.len().max(1) * REPORT_BYTES_PER_TASK + REPORT_GROWTH_SLACK;
        if let Err(err) = ensure_capacity(back, need) {
            warn!("report rebuild abandoned: {err}");
            return false;
        }
        let mut out = ReportWriter { buf: &mut *back };
        if render(&mut out, &tasks).is_err() {
            warn!("report rebuild abandoned: buffer could not grow");
            return false;
        }
        std::mem::swap(front, back);
        trace!("report rebuilt: {} tasks, {} bytes", tasks.len(), front.len());
        true
    }

    /// Length of the visible text in chars.
    pub fn len(&self) -> usize {
        self.lock().front.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().front.is_empty()
    }

    /// Copy up to `capacity - 1` chars of the visible text into `dst`, leaving
    /// room for a terminator on the caller's side. Returns the chars copied.
    pub fn copy_into(&self, dst: &mut String, capacity: usize) -> usize {
        dst.clear();
        if capacity == 0 {
            return 0;
        }
        let buffers = self.lock();
        let mut copied = 0;
        for ch in buffers.front.chars().take(capacity - 1) {
            dst.push(ch);
            copied += 1;
        }
        copied
    }

    pub fn text(&self) -> String {
        self.lock().front.clone()
    }

    /// Drop the visible text and forget pending changes.
    pub fn clear(&self) {
        let mut buffers = self.lock();
        buffers.front.clear();
        buffers.back.clear();
        self.dirty.store(false, Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.buffers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Capacity a buffer of `current` bytes should grow to so it can hold `need`:
/// doubling from [`REPORT_GROWTH_BASE`], exact fit once past [`REPORT_GROWTH_CAP`].
fn growth_target(current: usize, need: usize) -> usize {
    let mut cap = if current == 0 {
        REPORT_GROWTH_BASE
    } else {
        current
    };
    while cap < need {
        if cap > REPORT_GROWTH_CAP {
            return need;
        }
        cap = cap.saturating_mul(2);
    }
    cap
}

fn ensure_capacity(buf: &mut String, need: usize) -> Result<(), TryReserveError> {
    if need <= buf.capacity() {
        return Ok(());
    }
    let target = growth_target(buf.capacity(), need);
    buf.try_reserve_exact(target - buf.len())
}

/// `fmt::Write` over a report buffer that grows through [`ensure_capacity`]
/// and surfaces allocation failure as `fmt::Error`.
struct ReportWriter<'a> {
    buf: &'a mut String,
}

impl Write for ReportWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let need = self.buf.len() + s.len();
        if need > self.buf.capacity() {
            ensure_capacity(self.buf, need + REPORT_GROWTH_SLACK).map_err(|_| fmt::Error)?;
        }
        self.buf.push_str(s);
        Ok(())
    }
}

fn render(out: &mut impl Write, tasks: &[TaskView]) -> fmt::Result {
    for (i, task) in tasks.iter().enumerate() {
        if i > 0 {
            writeln!(out, "{SEPARATOR}")?;
        }
        render_task(out, task)?;
        writeln!(out)?;
    }
    Ok(())
}

fn render_task(out: &mut impl Write, task: &TaskView) -> fmt::Result {
    writeln!(out, "File: {}", task.path.display())?;
    writeln!(out, "Size: {}", format_bytes(task.size))?;
    match task.modified {
        Some(modified) => writeln!(out, "Modified: {}", modified.format(MODIFIED_FORMAT))?,
        None => writeln!(out, "Modified: (unknown)")?,
    }
    if let Some(version) = &task.version {
        writeln!(out, "Version: {version}")?;
    }

    match task.elapsed {
        Some(elapsed) => {
            let secs = elapsed.max(MIN_ELAPSED).as_secs_f64();
            let mbps = task.bytes_done as f64 / MIB as f64 / secs;
            writeln!(
                out,
                "Progress: {}% ({} / {}), {:.2} MB/s, {:.2} s",
                task.percent(),
                format_bytes(task.bytes_done),
                format_bytes(task.size),
                mbps,
                secs
            )?;
        }
        None => writeln!(out, "Progress: queued")?,
    }

    for kind in task.digests.kinds() {
        writeln!(out, "{}: {}", kind.label(), digest_status(task, kind))?;
    }
    Ok(())
}

fn digest_status(task: &TaskView, kind: DigestKind) -> &str {
    if !task.finished {
        return "computing...";
    }
    match task.digest(kind) {
        Some(hex) => hex,
        None if task.canceled => "(canceled)",
        None => "(failed)",
    }
}

pub fn format_bytes(bytes: u64) -> String {
    let b = bytes as f64;
    if bytes >= GIB {
        format!("{:.2} GB", b / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MB", b / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KB", b / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
