//! Redis cache backend
//!
//! Stores raw payloads under prefixed keys; Redis enforces the TTL.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{prefix_or_default, prefixed_key};
use crate::cache::{Cache, Ttl};
use crate::error::{CacheError, Result};

/// Default prefix to prevent collision with other keys stored in Redis
pub const REDIS_PREFIX: &str = "r_cache:";

/// Keys fetched per SCAN round trip.
const SCAN_BATCH_SIZE: usize = 100;

/// MATCH pattern for every key under `prefix`, with glob characters in the
/// prefix taken literally.
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

fn backend_error(e: RedisError) -> CacheError {
    CacheError::Backend(format!("Redis: {}", e))
}

/// Expiry in milliseconds, rounded up so sub-millisecond TTLs still expire.
fn ttl_millis(ttl: Duration) -> u64 {
    let millis = ttl.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}

/// Redis-backed cache.
///
/// The connection is opened on first use and shared afterwards; the
/// connection manager reconnects on its own.
pub struct RedisCache {
    client: Client,
    conn: OnceCell<ConnectionManager>,
    prefix: String,
}

impl RedisCache {
    /// Creates a cache for the server at `url`.
    ///
    /// No connection is made until the first operation. An empty prefix
    /// falls back to [`REDIS_PREFIX`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mini_cache::remote::RedisCache;
    ///
    /// let cache = RedisCache::new("redis://127.0.0.1:6379", "myapp:").unwrap();
    /// assert_eq!(cache.prefix(), "myapp:");
    /// ```
    pub fn new(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(url).map_err(|e| {
            CacheError::Misconfiguration(format!("Invalid Redis URL {}: {}", url, e))
        })?;

        Ok(Self {
            client,
            conn: OnceCell::new(),
            prefix: prefix_or_default(prefix, REDIS_PREFIX),
        })
    }

    /// Namespace prepended to every key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        prefixed_key(&self.prefix, key)
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                debug!("Opening Redis connection");
                ConnectionManager::new(self.client.clone()).await
            })
            .await
            .map_err(backend_error)?;

        Ok(conn.clone())
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn put(&self, key: &str, data: Vec<u8>, ttl: Ttl) -> Result<()> {
        let full_key = self.key(key);
        let mut conn = self.connection().await?;

        match ttl {
            Ttl::Forever => conn.set::<_, _, ()>(&full_key, data).await,
            Ttl::After(ttl) => {
                conn.pset_ex::<_, _, ()>(&full_key, data, ttl_millis(ttl))
                    .await
            }
            // Never retrievable, so nothing to keep
            Ttl::Expired => conn.del::<_, ()>(&full_key).await,
        }
        .map_err(backend_error)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = conn.get(self.key(key)).await.map_err(backend_error)?;
        value.ok_or(CacheError::Miss)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        let removed: i64 = conn.del(self.key(key)).await.map_err(backend_error)?;
        if removed == 0 {
            return Err(CacheError::Miss);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> bool {
        let Ok(mut conn) = self.connection().await else {
            return false;
        };

        conn.exists::<_, bool>(self.key(key)).await.unwrap_or(false)
    }

    async fn clear_all(&self) -> Result<()> {
        let mut conn = self.connection().await?;

        // Only this cache's namespace, other data in the database stays.
        // SCAN walks the keyspace in batches instead of blocking on KEYS.
        let pattern = scan_pattern(&self.prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(&mut conn)
                .await
                .map_err(backend_error)?;

            if !keys.is_empty() {
                // UNLINK frees the values off the server's main thread
                redis::cmd("UNLINK")
                    .arg(&keys)
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(backend_error)?;
                removed += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(prefix = %self.prefix, removed, "Cleared Redis namespace");
        Ok(())
    }
}
