//! Mini Cache - demo driver
//!
//! Instantiates the configured adapter and walks through its operations.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_cache::{AdapterRegistry, Cache, Config, JsonSerializer, Serializer, Ttl};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
}

/// Main entry point for the cache demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the adapter registry and instantiate `CACHE_ADAPTER`
/// 4. Put, read, overwrite, delete and clear entries, logging each outcome
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: adapter={}, gc_interval={}s, cache_dir={}",
        config.adapter,
        config.gc_interval,
        config.cache_dir.display()
    );

    let registry = AdapterRegistry::with_defaults(&config);
    info!("Available adapters: {}", registry.names().join(", "));

    let cache = registry
        .new_cache(&config.adapter)
        .with_context(|| format!("Failed to create the {} cache", config.adapter))?;

    run_demo(cache.as_ref()).await?;

    info!("Demo complete");
    Ok(())
}

async fn run_demo(cache: &dyn Cache) -> anyhow::Result<()> {
    let serializer = JsonSerializer;

    cache
        .put("example", serializer.serialize_bytes(b"cache"), Ttl::After(Duration::from_secs(10)))
        .await?;
    let raw = cache.get("example").await?;
    info!("example -> {:?}", String::from_utf8_lossy(&serializer.deserialize_bytes(&raw)));

    let user = User {
        name: "example".to_string(),
    };
    cache
        .put("user", serializer.serialize(&user)?, Ttl::After(Duration::from_secs(10)))
        .await?;
    let stored: User = serializer.deserialize(&cache.get("user").await?)?;
    info!("user -> {:?} (round trip ok: {})", stored, stored == user);

    let renamed = User {
        name: "renamed".to_string(),
    };
    cache.put("user", serializer.serialize(&renamed)?, Ttl::Forever).await?;
    let stored: User = serializer.deserialize(&cache.get("user").await?)?;
    info!("user after overwrite -> {:?}", stored);

    cache.put("short", b"n".to_vec(), Ttl::After(Duration::from_millis(200))).await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    match cache.get("short").await {
        Err(e) if e.is_miss() => info!("short -> expired as expected"),
        other => warn!("short -> unexpected {:?}", other),
    }

    cache.delete("user").await?;
    info!("user exists after delete: {}", cache.exists("user").await);

    cache.clear_all().await?;
    match cache.get("example").await {
        Err(e) if e.is_miss() => info!("example -> miss after clear_all"),
        other => warn!("example -> unexpected {:?}", other),
    }

    Ok(())
}
