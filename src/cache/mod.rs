//! Cache Module
//!
//! The `Cache` capability set and its local backends: an in-memory store and
//! a filesystem store, both with TTL expiration and background reclamation.

mod file;
mod item;
mod memory;
mod serializer;


use async_trait::async_trait;

use crate::error::Result;

// Re-export public types
pub use file::FileStore;
pub use item::{CacheItem, Ttl, EXPIRES_DEFAULT, EXPIRES_FOREVER};
pub use memory::MemoryStore;
pub use serializer::{JsonSerializer, Serializer};

// == Cache Trait ==
/// Behaviour shared by every cache adapter.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Stores `data` under `key` for `ttl`, overwriting any previous value.
    async fn put(&self, key: &str, data: Vec<u8>, ttl: Ttl) -> Result<()>;

    /// Returns the value stored under `key`.
    ///
    /// Fails with [`CacheError::Miss`](crate::error::CacheError::Miss) when the
    /// key is absent or its item has expired.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Removes the value stored under `key`.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Returns true if `key` holds a live value.
    async fn exists(&self, key: &str) -> bool;

    /// Removes every value held by this cache.
    async fn clear_all(&self) -> Result<()>;
}
