//! Subscriber setup for hosts that do not install their own.
//!
//! The engine only emits `tracing` events; a presentation layer with its own
//! subscriber can skip this module entirely.

use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "hashtool=info,warn";

/// Install a human-readable subscriber filtered by `RUST_LOG`.
///
/// Returns `false` when a global subscriber is already set.
pub fn init_logging() -> bool {
    fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Same as [`init_logging`] but emits one JSON object per event.
pub fn init_json_logging() -> bool {
    fmt()
        .json()
        .with_env_filter(env_filter())
        .try_init()
        .is_ok()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
