//! Tunables shared across the engine.

use std::time::Duration;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Maximum number of tasks a registry holds unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 250;

/// Sequential read size fed to the digest contexts.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * MIB as usize;

/// Upper bound on `chunk_size_mib`; each worker allocates one chunk.
pub const MAX_CHUNK_SIZE_MIB: u64 = 1024;

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 64;

/// Worker-side gate for percent recomputation and progress events.
pub const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum spacing between two unforced report rebuilds.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(250);

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Initial reservation for the report text, in bytes.
pub const DEFAULT_REPORT_INITIAL_BYTES: usize = 128 * 1024;

/// First growth step for an empty report buffer.
pub const REPORT_GROWTH_BASE: usize = 64 * 1024;

/// Above this many bytes the report buffer stops doubling and grows to fit.
pub const REPORT_GROWTH_CAP: usize = 16 * 1024 * 1024;

/// Extra headroom requested whenever the report buffer has to grow.
pub const REPORT_GROWTH_SLACK: usize = 4096;

/// Rough per-task size estimate used to pre-size a rebuild.
pub const REPORT_BYTES_PER_TASK: usize = 1024;

/// Files larger than this are not scanned for a version resource.
pub const DEFAULT_VERSION_SCAN_LIMIT: u64 = 64 * MIB;

/// Lower bound on elapsed time used for throughput math.
pub const MIN_ELAPSED: Duration = Duration::from_millis(1);

/// Idle poll used by pool workers so a shrink is observed without new work.
pub const WORKER_IDLE_POLL: Duration = Duration::from_millis(50);

/// Sentinel stored in `last_notified_percent` before the first notification.
pub const PERCENT_NEVER_NOTIFIED: i64 = -1;
