//! Memory Store Module
//!
//! In-process cache engine: a lock-guarded map of serialized items with
//! background reclamation of expired entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheItem, JsonSerializer, Serializer, Ttl};
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_trash_gc, Sweep, TrashGc};

// == Shared State ==
/// State shared between the store handle and its trash gc task.
struct MemoryInner<S> {
    /// Key to serialized item
    items: RwLock<HashMap<String, Vec<u8>>>,
    serializer: S,
}

impl<S: Serializer> MemoryInner<S> {
    fn decode(&self, record: &[u8]) -> Result<CacheItem> {
        self.serializer.deserialize(record)
    }

    /// Removes `key` if the record stored under it is still expired.
    ///
    /// Runs after the read lock has been released, so a writer may have
    /// replaced the record in between.
    async fn evict_if_expired(&self, key: &str) {
        let mut items = self.items.write().await;

        let still_expired = items
            .get(key)
            .map(|record| matches!(self.decode(record), Ok(item) if item.is_expired()))
            .unwrap_or(false);

        if still_expired {
            items.remove(key);
            debug!(key, "Evicted expired entry on read");
        }
    }
}

#[async_trait]
impl<S: Serializer> Sweep for MemoryInner<S> {
    async fn sweep(&self) -> usize {
        let mut items = self.items.write().await;
        let before = items.len();

        items.retain(|key, record| match self.decode(record) {
            Ok(item) => !item.is_expired(),
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping undecodable entry during trash gc");
                true
            }
        });

        before - items.len()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// == Memory Store ==
/// In-memory cache store guarded by a single reader/writer lock.
pub struct MemoryStore<S: Serializer = JsonSerializer> {
    inner: Arc<MemoryInner<S>>,
    gc: TrashGc,
}

impl MemoryStore<JsonSerializer> {
    // == Constructor ==
    /// Creates an empty store and starts its trash gc loop.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    /// * `gc_interval` - Time between reclamation passes (below 1s, 60s is used)
    pub fn new(gc_interval: Duration) -> Self {
        Self::with_serializer(gc_interval, JsonSerializer)
    }
}

impl<S: Serializer> MemoryStore<S> {
    /// Creates an empty store using the given serializer.
    pub fn with_serializer(gc_interval: Duration, serializer: S) -> Self {
        let inner = Arc::new(MemoryInner {
            items: RwLock::new(HashMap::new()),
            serializer,
        });
        let gc = spawn_trash_gc(inner.clone(), gc_interval);

        Self { inner, gc }
    }

    /// Returns the number of stored entries, expired ones not yet reclaimed included.
    pub async fn len(&self) -> usize {
        self.inner.items.read().await.len()
    }

    /// Returns true if the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.inner.items.read().await.is_empty()
    }

    /// Stops the trash gc loop. Also happens on drop.
    pub fn close(&self) {
        self.gc.stop();
    }
}

#[async_trait]
impl<S: Serializer> Cache for MemoryStore<S> {
    async fn put(&self, key: &str, data: Vec<u8>, ttl: Ttl) -> Result<()> {
        let item = CacheItem::new(data, ttl);
        let record = self.inner.serializer.serialize(&item)?;

        self.inner.items.write().await.insert(key.to_string(), record);
        debug!(key, ?ttl, "Stored entry");

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let item = {
            let items = self.inner.items.read().await;
            let record = items.get(key).ok_or(CacheError::Miss)?;
            self.inner.decode(record)?
        };

        if item.is_expired() {
            self.inner.evict_if_expired(key).await;
            return Err(CacheError::Miss);
        }

        Ok(item.data)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.inner.items.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(CacheError::Miss),
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let items = self.inner.items.read().await;

        match items.get(key).map(|record| self.inner.decode(record)) {
            Some(Ok(item)) => !item.is_expired(),
            _ => false,
        }
    }

    async fn clear_all(&self) -> Result<()> {
        *self.inner.items.write().await = HashMap::new();
        Ok(())
    }
}
