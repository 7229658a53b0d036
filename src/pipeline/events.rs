//! # Engine Events
//!
//! Signals delivered to the presentation layer through the notification channel.
//! They carry no state of their own: a receiver reacts by pulling a fresh
//! summary or report from the engine.

use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Throttled progress tick from a running worker
    Progress,
    /// A task reached its final state (done, failed, or canceled)
    TaskFinished(TaskId),
    /// A file was accepted into the registry
    TaskAdded(TaskId),
    /// The pool size changed
    WorkersResized(usize),
    /// Cancellation was requested for every task
    Canceled,
    /// The registry was emptied
    Cleared,
}
