//! Adapter Registry
//!
//! Maps adapter names to constructors so the backend can be picked from
//! configuration at startup.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{Cache, FileStore, MemoryStore};
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Builds a fresh cache instance.
pub type Constructor = Box<dyn Fn() -> Result<Arc<dyn Cache>> + Send + Sync>;

// == Adapter Registry ==
/// Name → constructor table, owned by whatever composes the application.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Constructor>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every backend compiled into the crate,
    /// each configured from `config`.
    ///
    /// Registered names: `memory`, `file`, and with their cargo features
    /// `redis` and `memcache`.
    pub fn with_defaults(config: &Config) -> Self {
        let mut registry = Self::new();
        let gc_interval = config.gc_interval();

        registry.insert("memory", move || {
            Ok(Arc::new(MemoryStore::new(gc_interval)) as Arc<dyn Cache>)
        });

        let cache_dir = config.cache_dir.clone();
        registry.insert("file", move || {
            Ok(Arc::new(FileStore::new(cache_dir.clone(), gc_interval)?) as Arc<dyn Cache>)
        });

        #[cfg(feature = "redis-backend")]
        {
            let url = config.redis_url.clone();
            let prefix = config.redis_prefix.clone();
            registry.insert("redis", move || {
                Ok(Arc::new(crate::remote::RedisCache::new(&url, prefix.clone())?) as Arc<dyn Cache>)
            });
        }

        #[cfg(feature = "memcached-backend")]
        {
            let addr = config.memcached_addr.clone();
            let prefix = config.memcached_prefix.clone();
            registry.insert("memcache", move || {
                Ok(Arc::new(crate::remote::MemcachedCache::new(addr.clone(), prefix.clone()))
                    as Arc<dyn Cache>)
            });
        }

        registry
    }

    fn insert<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn() -> Result<Arc<dyn Cache>> + Send + Sync + 'static,
    {
        self.adapters.insert(name.to_string(), Box::new(constructor));
    }

    /// Makes an adapter available under `name`.
    ///
    /// # Errors
    /// Returns [`CacheError::AdapterExists`] if the name is already taken.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> Result<()>
    where
        F: Fn() -> Result<Arc<dyn Cache>> + Send + Sync + 'static,
    {
        if self.adapters.contains_key(name) {
            return Err(CacheError::AdapterExists(name.to_string()));
        }

        self.insert(name, constructor);
        debug!(adapter = name, "Registered cache adapter");
        Ok(())
    }

    /// Instantiates the adapter registered under `name`.
    ///
    /// # Errors
    /// Returns [`CacheError::UnknownAdapter`] for unregistered names, or the
    /// constructor's own error.
    pub fn new_cache(&self, name: &str) -> Result<Arc<dyn Cache>> {
        let constructor = self
            .adapters
            .get(name)
            .ok_or_else(|| CacheError::UnknownAdapter(name.to_string()))?;

        constructor()
    }

    /// Registered adapter names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Ttl;
    use std::time::Duration;

    fn memory_constructor() -> Result<Arc<dyn Cache>> {
        Ok(Arc::new(MemoryStore::new(Duration::from_secs(60))) as Arc<dyn Cache>)
    }

    #[tokio::test]
    async fn test_register_and_new_cache() {
        let mut registry = AdapterRegistry::new();
        registry.register("mem", memory_constructor).unwrap();

        let cache = registry.new_cache("mem").unwrap();
        cache.put("k", b"v".to_vec(), Ttl::Forever).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), b"v");
    }

    #[test]
    fn test_register_twice_fails() {
        let mut registry = AdapterRegistry::new();
        registry.register("mem", memory_constructor).unwrap();

        let result = registry.register("mem", memory_constructor);
        assert!(matches!(result, Err(CacheError::AdapterExists(name)) if name == "mem"));
    }

    #[test]
    fn test_unknown_adapter() {
        let registry = AdapterRegistry::new();

        let result = registry.new_cache("nope");
        assert!(matches!(result, Err(CacheError::UnknownAdapter(_))));
    }

    #[test]
    fn test_default_names() {
        let registry = AdapterRegistry::with_defaults(&Config::default());
        let names = registry.names();

        assert!(names.contains(&"memory"));
        assert!(names.contains(&"file"));
        #[cfg(feature = "redis-backend")]
        assert!(names.contains(&"redis"));
        #[cfg(feature = "memcached-backend")]
        assert!(names.contains(&"memcache"));
    }

    #[test]
    fn test_defaults_reject_reregistration() {
        let mut registry = AdapterRegistry::with_defaults(&Config::default());

        let result = registry.register("memory", memory_constructor);
        assert!(matches!(result, Err(CacheError::AdapterExists(_))));
    }
}
