use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::constants::{
    DEFAULT_CAPACITY, DEFAULT_CHUNK_SIZE, DEFAULT_EVENT_CAPACITY, DEFAULT_NOTIFY_INTERVAL,
    DEFAULT_REPORT_INITIAL_BYTES, DEFAULT_REPORT_INTERVAL, DEFAULT_VERSION_SCAN_LIMIT,
    MAX_CHUNK_SIZE_MIB, MAX_WORKERS, MIB, MIN_WORKERS,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("capacity must be at least 1")]
    ZeroCapacity,
    #[error("chunk_size_mib must be at least 1")]
    ZeroChunkSize,
    #[error("chunk_size_mib must be at most {max}")]
    ChunkSizeTooLarge { max: u64 },
    #[error("event_capacity must be at least 1")]
    ZeroEventCapacity,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct EngineConfig {
    pub capacity: usize,
    pub chunk_size_mib: u64,
    /// 0 means one worker per logical core.
    pub workers: usize,
    pub notify_interval_ms: u64,
    pub report_interval_ms: u64,
    pub event_capacity: usize,
    pub report_initial_bytes: usize,
    pub version_scan_limit_mib: u64,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.chunk_size_mib == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.chunk_size_mib > MAX_CHUNK_SIZE_MIB {
            return Err(ConfigError::ChunkSizeTooLarge {
                max: MAX_CHUNK_SIZE_MIB,
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        Ok(())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size_mib.saturating_mul(MIB) as usize
    }

    /// Configured pool size, resolved against the host and clamped.
    pub fn worker_count(&self) -> usize {
        let requested = if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        };
        clamp_workers(requested)
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn version_scan_limit(&self) -> u64 {
        self.version_scan_limit_mib.saturating_mul(MIB)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            chunk_size_mib: DEFAULT_CHUNK_SIZE as u64 / MIB,
            workers: 0,
            notify_interval_ms: DEFAULT_NOTIFY_INTERVAL.as_millis() as u64,
            report_interval_ms: DEFAULT_REPORT_INTERVAL.as_millis() as u64,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            report_initial_bytes: DEFAULT_REPORT_INITIAL_BYTES,
            version_scan_limit_mib: DEFAULT_VERSION_SCAN_LIMIT / MIB,
        }
    }
}

pub fn clamp_workers(n: usize) -> usize {
    n.clamp(MIN_WORKERS, MAX_WORKERS)
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    pub config_hash: String,
}

const DEFAULT_CONFIG: &[u8] = include_bytes!("../config/default.yml");

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        DEFAULT_CONFIG.to_vec()
    };

    let config: EngineConfig = serde_yaml::from_slice(&bytes)?;
    config.validate()?;

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}
