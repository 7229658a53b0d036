//! # Task Registry
//!
//! Fixed-capacity arena of tasks in insertion order, with a key set for
//! case-insensitive duplicate detection. The registry mutex also serializes
//! every update that moves `total_bytes` relative to `done_bytes`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::debug;

use crate::digest::DigestSet;
use crate::probe;
use crate::progress::ProgressAggregator;
use crate::task::{HashTask, TaskId, TaskView, normalize_key};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddFileError {
    #[error("path is empty")]
    EmptyPath,
    #[error("no digest requested for {0}")]
    NoDigestRequested(PathBuf),
    #[error("registry is full ({capacity} tasks)")]
    CapacityExhausted { capacity: usize },
    #[error("already queued: {0}")]
    Duplicate(PathBuf),
    #[error("scheduler rejected {0}")]
    SchedulerClosed(PathBuf),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClearError {
    #[error("{0} task(s) still running")]
    TasksRunning(usize),
}

#[derive(Debug, Default)]
struct Slots {
    tasks: Vec<Arc<HashTask>>,
    keys: HashSet<String>,
    /// Id of `tasks[0]`. Advanced by every clear so ids are never reused.
    base: usize,
}

#[derive(Debug)]
pub struct TaskRegistry {
    capacity: usize,
    slots: Mutex<Slots>,
}

impl TaskRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(Slots {
                tasks: Vec::with_capacity(capacity),
                keys: HashSet::with_capacity(capacity),
                base: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate, account, and submit one file.
    ///
    /// `submit` runs under the registry lock after the task's size has been
    /// added to the batch total and the running count raised; if it fails both
    /// are rolled back and the task is discarded.
    pub fn add<F>(
        &self,
        path: &Path,
        digests: DigestSet,
        progress: &ProgressAggregator,
        submit: F,
    ) -> Result<TaskId, AddFileError>
    where
        F: FnOnce(Arc<HashTask>) -> bool,
    {
        if path.as_os_str().is_empty() {
            return Err(AddFileError::EmptyPath);
        }
        if digests.is_empty() {
            return Err(AddFileError::NoDigestRequested(path.to_path_buf()));
        }
        let key = normalize_key(path);

        let mut slots = self.lock();
        if slots.tasks.len() >= self.capacity {
            return Err(AddFileError::CapacityExhausted {
                capacity: self.capacity,
            });
        }
        if slots.keys.contains(&key) {
            return Err(AddFileError::Duplicate(path.to_path_buf()));
        }

        if slots.tasks.is_empty() {
            progress.reset_batch();
        } else if progress.running() == 0 {
            progress.settle();
        }
        progress.ensure_started();
        progress.clear_cancel();

        let stat = probe::stat(path);
        let id = TaskId(slots.base + slots.tasks.len());
        let task = Arc::new(HashTask::new(
            id,
            path.to_path_buf(),
            key.clone(),
            digests,
            stat.size,
            stat.modified,
        ));

        progress.add_total(stat.size as i64);
        progress.task_started();
        if !submit(Arc::clone(&task)) {
            progress.task_finished();
            progress.add_total(-(stat.size as i64));
            return Err(AddFileError::SchedulerClosed(path.to_path_buf()));
        }

        debug!("queued {} {} ({} bytes)", id, path.display(), stat.size);
        slots.keys.insert(key);
        slots.tasks.push(task);
        Ok(id)
    }

    /// Empty the registry and zero the batch. Refused while work is in flight.
    pub fn clear(&self, progress: &ProgressAggregator) -> Result<(), ClearError> {
        let mut slots = self.lock();
        let running = progress.running();
        if running != 0 {
            return Err(ClearError::TasksRunning(running));
        }
        slots.base += slots.tasks.len();
        slots.tasks.clear();
        slots.keys.clear();
        progress.clear();
        Ok(())
    }

    /// Fold a dispatch-time size change into the batch total.
    pub(crate) fn reconcile_size(
        &self,
        task: &HashTask,
        real_size: u64,
        progress: &ProgressAggregator,
    ) -> i64 {
        let _slots = self.lock();
        if real_size == task.size_initial() {
            return 0;
        }
        let delta = task.resize(real_size);
        progress.add_total(delta);
        delta
    }

    pub fn snapshot(&self) -> Vec<TaskView> {
        self.lock().tasks.iter().map(|task| task.view()).collect()
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<HashTask>> {
        let slots = self.lock();
        id.0
            .checked_sub(slots.base)
            .and_then(|index| slots.tasks.get(index))
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
