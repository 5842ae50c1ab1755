//! Cache Item Module
//!
//! Defines the stored record: a payload, its creation time and its TTL.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// == Time To Live ==
/// How long an item stays retrievable after it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ttl {
    /// Zero duration: the item is expired from the start and never retrievable
    Expired,
    /// The item never expires
    Forever,
    /// The item expires once more than this duration has elapsed
    After(Duration),
}

impl Ttl {
    /// Builds a TTL from a duration, mapping zero to [`Ttl::Expired`].
    pub fn after(duration: Duration) -> Self {
        if duration.is_zero() {
            Ttl::Expired
        } else {
            Ttl::After(duration)
        }
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::after(duration)
    }
}

/// TTL sentinel for an item that is already expired.
pub const EXPIRES_DEFAULT: Ttl = Ttl::Expired;

/// TTL sentinel for an item that never expires.
pub const EXPIRES_FOREVER: Ttl = Ttl::Forever;

// == Cache Item ==
/// A cached piece of data with its expiration metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheItem {
    /// Write timestamp
    pub created_time: DateTime<Utc>,
    /// The stored payload, base64 in serialized records
    #[serde(with = "payload_base64")]
    pub data: Vec<u8>,
    /// Time to live, counted from `created_time`
    pub expired: Ttl,
}

/// Serde support for payload bytes as a base64 string.
mod payload_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(data).serialize(serializer)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

impl CacheItem {
    // == Constructor ==
    /// Creates a new item stamped with the current time.
    ///
    /// # Arguments
    /// * `data` - The payload to store
    /// * `ttl` - How long the payload stays retrievable
    pub fn new(data: Vec<u8>, ttl: Ttl) -> Self {
        Self {
            created_time: Utc::now(),
            data,
            expired: ttl,
        }
    }

    // == Is Expired ==
    /// Checks the item against the current wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks the item against a given instant.
    ///
    /// # Returns
    /// - `false` for [`Ttl::Forever`]
    /// - `true` for [`Ttl::Expired`], even at `now == created_time`
    /// - for [`Ttl::After`], `true` once strictly more than the TTL has elapsed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expired {
            Ttl::Forever => false,
            Ttl::Expired => true,
            Ttl::After(ttl) => match TimeDelta::from_std(ttl) {
                Ok(limit) => now.signed_duration_since(self.created_time) > limit,
                // Out of chrono's range, so it cannot elapse
                Err(_) => false,
            },
        }
    }
}
