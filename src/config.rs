//! Configuration Module
//!
//! Options applied when caches and frontends are constructed.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShoveError};

/// Construction-time options shared by caches and frontends.
///
/// Every field has a default, so partial documents deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShoveConfig {
    /// Capacity bound for TTL and LRU caches
    pub max_entries: usize,
    /// Seconds before an untouched cache key becomes eligible for expiry
    pub timeout: u64,
    /// Milliseconds between purge sweeps; 0 sweeps without sleeping
    pub purge_timeout_ms: u64,
    /// Buffered writes that trigger an automatic sync
    pub sync: usize,
    /// Worker pool size for the threaded multi-store frontend
    pub max_workers: usize,
    /// Compress encoded values
    pub compress: bool,
}

impl ShoveConfig {
    /// Creates a new config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SHOVE_MAX_ENTRIES` - cache capacity (default: 300)
    /// - `SHOVE_TIMEOUT` - TTL in seconds (default: 300)
    /// - `SHOVE_PURGE_TIMEOUT_MS` - purge interval in ms (default: 200)
    /// - `SHOVE_SYNC` - auto-sync threshold (default: 2)
    /// - `SHOVE_MAX_WORKERS` - fan-out pool size (default: 2)
    /// - `SHOVE_COMPRESS` - `true`/`false` (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("SHOVE_MAX_ENTRIES", defaults.max_entries),
            timeout: env_or("SHOVE_TIMEOUT", defaults.timeout),
            purge_timeout_ms: env_or("SHOVE_PURGE_TIMEOUT_MS", defaults.purge_timeout_ms),
            sync: env_or("SHOVE_SYNC", defaults.sync),
            max_workers: env_or("SHOVE_MAX_WORKERS", defaults.max_workers),
            compress: env_or("SHOVE_COMPRESS", defaults.compress),
        }
    }

    /// Rejects values no cache or frontend can honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(ShoveError::InvalidConfig(
                "max_entries must be at least 1".to_string(),
            ));
        }
        if self.sync == 0 {
            return Err(ShoveError::InvalidConfig(
                "sync threshold must be at least 1".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(ShoveError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Purge interval as a duration.
    pub fn purge_interval(&self) -> Duration {
        Duration::from_millis(self.purge_timeout_ms)
    }
}

impl Default for ShoveConfig {
    fn default() -> Self {
        Self {
            max_entries: 300,
            timeout: 300,
            purge_timeout_ms: 200,
            sync: 2,
            max_workers: 2,
            compress: false,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
