//! Mini Cache - A pluggable key-value cache
//!
//! One `Cache` capability set over interchangeable backends: an in-memory
//! store, a filesystem store and remote Redis/Memcached servers, all with
//! per-item TTL expiration.

pub mod cache;
pub mod config;
pub mod error;
pub mod registry;
pub mod remote;
pub mod tasks;

pub use cache::{Cache, CacheItem, FileStore, JsonSerializer, MemoryStore, Serializer, Ttl};
pub use config::Config;
pub use error::{CacheError, Result};
pub use registry::AdapterRegistry;
