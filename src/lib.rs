//! Parallel batch file hashing.
//!
//! Files are added to a fixed-capacity registry and hashed (MD5 and/or SHA-256)
//! on a resizable worker pool. Progress is accounted per file and per batch,
//! cancellation is cooperative, and a text report of every task can be pulled
//! at any time. See [`HashEngine`] for the entry point.

pub mod config;
pub mod constants;
pub mod digest;
pub mod engine;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod registry;
pub mod report;
pub mod task;

pub use config::{EngineConfig, LoadedConfig, load_config};
pub use digest::{DigestKind, DigestProvider, DigestSet, StandardDigests};
pub use engine::{EngineError, HashEngine};
pub use pipeline::events::EngineEvent;
pub use progress::Summary;
pub use registry::{AddFileError, ClearError};
pub use task::{TaskId, TaskState, TaskView};
