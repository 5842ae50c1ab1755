//! Configuration Module
//!
//! Handles loading backend settings from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the adapter to instantiate from the registry
    pub adapter: String,
    /// Reclamation interval in seconds for the memory and file stores
    pub gc_interval: u64,
    /// Base directory of the file store
    pub cache_dir: PathBuf,
    /// Redis connection URL
    pub redis_url: String,
    /// Key namespace used on Redis
    pub redis_prefix: String,
    /// Memcached server address
    pub memcached_addr: String,
    /// Key namespace used on Memcached
    pub memcached_prefix: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ADAPTER` - Adapter name (default: memory)
    /// - `GC_INTERVAL` - Reclamation frequency in seconds (default: 60)
    /// - `CACHE_DIR` - File store directory (default: ./tmp/cache)
    /// - `REDIS_URL` - Redis URL (default: redis://127.0.0.1:6379)
    /// - `REDIS_PREFIX` - Redis key prefix (default: r_cache:)
    /// - `MEMCACHED_ADDR` - Memcached address (default: 127.0.0.1:11211)
    /// - `MEMCACHED_PREFIX` - Memcached key prefix (default: mem_cache:)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            adapter: env::var("CACHE_ADAPTER").unwrap_or(defaults.adapter),
            gc_interval: env::var("GC_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.gc_interval),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            redis_prefix: env::var("REDIS_PREFIX").unwrap_or(defaults.redis_prefix),
            memcached_addr: env::var("MEMCACHED_ADDR").unwrap_or(defaults.memcached_addr),
            memcached_prefix: env::var("MEMCACHED_PREFIX").unwrap_or(defaults.memcached_prefix),
        }
    }

    /// Reclamation interval as a Duration.
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adapter: "memory".to_string(),
            gc_interval: 60,
            cache_dir: PathBuf::from("./tmp/cache"),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_prefix: "r_cache:".to_string(),
            memcached_addr: "127.0.0.1:11211".to_string(),
            memcached_prefix: "mem_cache:".to_string(),
        }
    }
}
