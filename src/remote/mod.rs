//! Remote Backends Module
//!
//! Thin wrappers translating the `Cache` operations onto external cache
//! servers. Expiration is enforced by the server itself.

#[cfg(feature = "memcached-backend")]
mod memcached;
#[cfg(feature = "redis-backend")]
mod redis_backend;

#[cfg(feature = "memcached-backend")]
pub use memcached::{MemcachedCache, MEMCACHED_PREFIX};
#[cfg(feature = "redis-backend")]
pub use redis_backend::{RedisCache, REDIS_PREFIX};

/// Joins a namespace prefix and a caller key.
#[cfg_attr(not(any(feature = "redis-backend", feature = "memcached-backend")), allow(dead_code))]
pub(crate) fn prefixed_key(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}

/// Falls back to `default` when no prefix was configured.
#[cfg_attr(not(any(feature = "redis-backend", feature = "memcached-backend")), allow(dead_code))]
pub(crate) fn prefix_or_default(prefix: impl Into<String>, default: &str) -> String {
    let prefix = prefix.into();
    if prefix.is_empty() {
        default.to_string()
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_key() {
        assert_eq!(prefixed_key("r_cache:", "user:1"), "r_cache:user:1");
        assert_eq!(prefixed_key("", "plain"), "plain");
    }

    #[test]
    fn test_prefix_or_default() {
        assert_eq!(prefix_or_default("", "r_cache:"), "r_cache:");
        assert_eq!(prefix_or_default("app:", "r_cache:"), "app:");
    }
}
