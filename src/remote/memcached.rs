//! Memcached cache backend
//!
//! Speaks the Memcached ASCII protocol through `memcache-async` over a Tokio
//! TCP stream. Memcached enforces the TTL.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use memcache_async::ascii::Protocol;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, warn};

use super::{prefix_or_default, prefixed_key};
use crate::cache::{Cache, Ttl};
use crate::error::{CacheError, Result};

/// Default prefix to prevent collision with other keys stored in Memcached
pub const MEMCACHED_PREFIX: &str = "mem_cache:";

/// Relative expirations above this many seconds are read as unix timestamps.
const MAX_RELATIVE_EXPIRATION: u64 = 60 * 60 * 24 * 30;

type MemcachedProtocol = Protocol<Compat<TcpStream>>;

/// Converts a TTL into Memcached's expiration field.
///
/// Zero means "never expires"; anything past 30 days has to be sent as an
/// absolute unix timestamp.
fn expiration_for(ttl: Duration, now_unix: u64) -> u32 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    let secs = secs.max(1);

    let value = if secs > MAX_RELATIVE_EXPIRATION {
        now_unix.saturating_add(secs)
    } else {
        secs
    };

    u32::try_from(value).unwrap_or(u32::MAX)
}

fn now_unix() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Longest key the server accepts.
const MAX_KEY_LENGTH: usize = 250;

/// Rejects keys the ASCII protocol cannot carry: too long, or holding
/// whitespace or control bytes that would split the command line.
fn validate_key(key: &str) -> Result<()> {
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key is {} bytes, Memcached allows {}",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }

    if key.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(CacheError::InvalidKey(format!(
            "{:?} contains whitespace or control characters",
            key
        )));
    }

    Ok(())
}

/// Memcached-backed cache over a single server connection.
///
/// The connection is opened on first use and dropped after an I/O failure,
/// so the next call reconnects.
pub struct MemcachedCache {
    addr: String,
    prefix: String,
    conn: Mutex<Option<MemcachedProtocol>>,
}

impl MemcachedCache {
    /// Creates a cache for the server at `addr` (e.g. `127.0.0.1:11211`).
    ///
    /// An empty prefix falls back to [`MEMCACHED_PREFIX`].
    pub fn new(addr: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            prefix: prefix_or_default(prefix, MEMCACHED_PREFIX),
            conn: Mutex::new(None),
        }
    }

    /// Namespace prepended to every key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefixed key, checked against the protocol's key rules.
    fn key(&self, key: &str) -> Result<String> {
        let full_key = prefixed_key(&self.prefix, key);
        validate_key(&full_key)?;
        Ok(full_key)
    }

    /// Takes the connection out of `slot`, connecting if it is empty.
    async fn checkout(&self, slot: &mut Option<MemcachedProtocol>) -> Result<MemcachedProtocol> {
        if let Some(protocol) = slot.take() {
            return Ok(protocol);
        }

        debug!(addr = %self.addr, "Opening Memcached connection");
        let stream = TcpStream::connect(&self.addr).await.map_err(|e| {
            CacheError::Backend(format!("Memcached connect to {}: {}", self.addr, e))
        })?;

        Ok(Protocol::new(stream.compat()))
    }

    /// Maps a command result, returning the connection to `slot` unless the
    /// command failed on I/O.
    fn checkin<T>(
        slot: &mut Option<MemcachedProtocol>,
        protocol: MemcachedProtocol,
        op: &str,
        result: io::Result<T>,
    ) -> Result<T> {
        match result {
            Ok(value) => {
                *slot = Some(protocol);
                Ok(value)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                *slot = Some(protocol);
                Err(CacheError::Miss)
            }
            Err(e) => {
                warn!(error = %e, "Memcached {} failed, dropping connection", op);
                Err(CacheError::Backend(format!("Memcached {}: {}", op, e)))
            }
        }
    }
}

#[async_trait]
impl Cache for MemcachedCache {
    async fn put(&self, key: &str, data: Vec<u8>, ttl: Ttl) -> Result<()> {
        let expiration = match ttl {
            Ttl::Forever => 0,
            Ttl::After(ttl) => expiration_for(ttl, now_unix()),
            Ttl::Expired => {
                return match self.delete(key).await {
                    Err(CacheError::Miss) => Ok(()),
                    other => other,
                };
            }
        };

        let full_key = self.key(key)?;
        let mut slot = self.conn.lock().await;
        let mut protocol = self.checkout(&mut slot).await?;

        let result = protocol.set(&full_key, &data, expiration).await;
        Self::checkin(&mut slot, protocol, "set", result)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let full_key = self.key(key)?;
        let mut slot = self.conn.lock().await;
        let mut protocol = self.checkout(&mut slot).await?;

        let result = protocol.get(&full_key).await;
        Self::checkin(&mut slot, protocol, "get", result)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.key(key)?;
        let mut slot = self.conn.lock().await;
        let mut protocol = self.checkout(&mut slot).await?;

        // The client only sends `delete ... noreply`: presence is checked with
        // a get first and the version round trip confirms the server took it.
        let result = async {
            protocol.get(&full_key).await?;
            protocol.delete(&full_key).await?;
            protocol.version().await.map(|_| ())
        }
        .await;
        Self::checkin(&mut slot, protocol, "delete", result)
    }

    async fn exists(&self, key: &str) -> bool {
        self.get(key).await.is_ok()
    }

    async fn clear_all(&self) -> Result<()> {
        let mut slot = self.conn.lock().await;
        let mut protocol = self.checkout(&mut slot).await?;

        let result = protocol.flush().await;
        Self::checkin(&mut slot, protocol, "flush_all", result)
    }
}
