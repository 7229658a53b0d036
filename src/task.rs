//! # Hash Tasks
//!
//! A [`HashTask`] is shared between the registry (reads for snapshots) and the
//! single worker that owns it while it runs. Scalar progress lives in atomics so
//! the worker never takes a lock per chunk; the rarely written metadata and
//! results sit behind a per-task mutex.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::constants::PERCENT_NEVER_NOTIFIED;
use crate::digest::{DigestKind, DigestSet};

/// Handle of a task, unique for the lifetime of its engine. Ids increase in
/// insertion order and are not reused after a clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    /// Accepted, not yet picked up by a worker.
    Queued,
    Hashing,
    /// Finished and every requested digest succeeded.
    Done,
    /// Finished with at least one requested digest missing.
    Failed,
    Canceled,
}

#[derive(Debug, Default)]
struct TaskDetails {
    modified: Option<DateTime<Local>>,
    version: Option<String>,
    started: Option<Instant>,
    ended: Option<Instant>,
    results: [Option<String>; 2],
}

#[derive(Debug)]
pub struct HashTask {
    id: TaskId,
    path: PathBuf,
    key: String,
    digests: DigestSet,
    size_initial: AtomicU64,
    size_current: AtomicU64,
    bytes_done: AtomicU64,
    finished: AtomicBool,
    canceled: AtomicBool,
    last_notified_percent: AtomicI64,
    details: Mutex<TaskDetails>,
}

impl HashTask {
    pub fn new(
        id: TaskId,
        path: PathBuf,
        key: String,
        digests: DigestSet,
        size: u64,
        modified: Option<DateTime<Local>>,
    ) -> Self {
        Self {
            id,
            path,
            key,
            digests,
            size_initial: AtomicU64::new(size),
            size_current: AtomicU64::new(size),
            bytes_done: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
            last_notified_percent: AtomicI64::new(PERCENT_NEVER_NOTIFIED),
            details: Mutex::new(TaskDetails {
                modified,
                ..TaskDetails::default()
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn digests(&self) -> DigestSet {
        self.digests
    }

    pub fn size_initial(&self) -> u64 {
        self.size_initial.load(Ordering::Relaxed)
    }

    pub fn size_current(&self) -> u64 {
        self.size_current.load(Ordering::Relaxed)
    }

    /// Record the size observed at dispatch. Returns the signed change against
    /// the enqueue-time size, which the caller folds into the batch total.
    pub(crate) fn resize(&self, real_size: u64) -> i64 {
        let initial = self.size_initial.swap(real_size, Ordering::Relaxed);
        self.size_current.store(real_size, Ordering::Relaxed);
        real_size as i64 - initial as i64
    }

    /// Bytes hashed so far, never above the current size.
    pub fn bytes_done(&self) -> u64 {
        self.bytes_done
            .load(Ordering::Relaxed)
            .min(self.size_current())
    }

    pub(crate) fn raw_bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    pub(crate) fn set_bytes_done(&self, bytes: u64) {
        self.bytes_done.store(bytes, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_canceled(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub(crate) fn mark_finished(&self) {
        self.lock_details().ended = Some(Instant::now());
        self.finished.store(true, Ordering::Release);
    }

    pub fn last_notified_percent(&self) -> i64 {
        self.last_notified_percent.load(Ordering::Relaxed)
    }

    /// Store `percent` if it is worth announcing: a rise of at least one point,
    /// completion, or any negative stored value. Returns whether it was stored.
    pub(crate) fn note_percent(&self, percent: i64) -> bool {
        let last = self.last_notified_percent();
        if percent > last || percent == 100 || last < 0 {
            self.last_notified_percent.store(percent, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub(crate) fn begin(&self, modified: Option<DateTime<Local>>, version: Option<String>) {
        let mut details = self.lock_details();
        details.started = Some(Instant::now());
        if modified.is_some() {
            details.modified = modified;
        }
        details.version = version;
    }

    pub(crate) fn set_result(&self, kind: DigestKind, hex: String) {
        self.lock_details().results[kind.index()] = Some(hex);
    }

    pub fn digest(&self, kind: DigestKind) -> Option<String> {
        self.lock_details().results[kind.index()].clone()
    }

    pub fn view(&self) -> TaskView {
        let details = self.lock_details();
        let finished = self.is_finished();
        let elapsed = details.started.map(|start| {
            details
                .ended
                .unwrap_or_else(Instant::now)
                .saturating_duration_since(start)
        });
        TaskView {
            id: self.id,
            path: self.path.clone(),
            size: self.size_current(),
            bytes_done: self.bytes_done(),
            modified: details.modified,
            version: details.version.clone(),
            digests: self.digests,
            md5: details.results[DigestKind::Md5.index()].clone(),
            sha256: details.results[DigestKind::Sha256.index()].clone(),
            started: details.started.is_some(),
            finished,
            canceled: self.is_canceled(),
            elapsed,
        }
    }

    fn lock_details(&self) -> std::sync::MutexGuard<'_, TaskDetails> {
        // Details hold plain values; a panic mid-write cannot leave them torn.
        self.details
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Point-in-time copy of a task, safe to render without holding any lock.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub path: PathBuf,
    pub size: u64,
    pub bytes_done: u64,
    pub modified: Option<DateTime<Local>>,
    pub version: Option<String>,
    pub digests: DigestSet,
    pub md5: Option<String>,
    pub sha256: Option<String>,
    pub started: bool,
    pub finished: bool,
    pub canceled: bool,
    pub elapsed: Option<Duration>,
}

impl TaskView {
    pub fn digest(&self, kind: DigestKind) -> Option<&str> {
        match kind {
            DigestKind::Md5 => self.md5.as_deref(),
            DigestKind::Sha256 => self.sha256.as_deref(),
        }
    }

    pub fn succeeded(&self, kind: DigestKind) -> bool {
        self.digest(kind).is_some()
    }

    /// Rounded completion; files of zero size report 0.
    pub fn percent(&self) -> u8 {
        percent_of(self.bytes_done, self.size)
    }

    pub fn state(&self) -> TaskState {
        if self.canceled {
            TaskState::Canceled
        } else if self.finished {
            if self.digests.kinds().all(|kind| self.succeeded(kind)) {
                TaskState::Done
            } else {
                TaskState::Failed
            }
        } else if self.started {
            TaskState::Hashing
        } else {
            TaskState::Queued
        }
    }
}

/// `round(100 * done / total)` clamped to 0..=100, 0 for an empty total.
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (done as f64 * 100.0 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Registry key: absolute, lexically normalized, case-folded.
pub fn normalize_key(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized.to_string_lossy().to_lowercase()
}
