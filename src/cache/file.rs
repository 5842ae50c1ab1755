//! File Store Module
//!
//! Persists serialized cache items as files sharded three directory levels
//! deep under a base directory.

use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cache::{Cache, CacheItem, JsonSerializer, Serializer, Ttl};
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_trash_gc, Sweep, TrashGc};

/// Name prefix of records still being written. The trash gc skips them.
const TEMP_PREFIX: &str = ".tmp-";

/// Guards replacing and removing entry files against each other.
type WriteLock = Arc<Mutex<()>>;

fn lock_writes(writes: &Mutex<()>) -> MutexGuard<'_, ()> {
    writes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs blocking filesystem work off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CacheError::Filesystem(io::Error::new(ErrorKind::Other, e)))?
}

fn map_read_error(e: io::Error) -> CacheError {
    match e.kind() {
        ErrorKind::NotFound => CacheError::Miss,
        _ => CacheError::Filesystem(e),
    }
}

/// Reads and decodes the item at `path`. A missing file is a miss.
fn read_item_blocking<S: Serializer>(path: &Path, serializer: &S) -> Result<CacheItem> {
    let bytes = std::fs::read(path).map_err(map_read_error)?;
    serializer.deserialize(&bytes)
}

/// Writes `record` next to `path` and renames it into place, so readers see
/// either the previous record or the new one.
fn write_record(path: &Path, record: &[u8], writes: &Mutex<()>) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        CacheError::Misconfiguration(format!("{} has no parent", path.display()))
    })?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)?;
    tmp.write_all(record)?;

    let _guard = lock_writes(writes);
    tmp.persist(path).map_err(|e| CacheError::Filesystem(e.error))?;
    Ok(())
}

/// Removes the file at `path` only if it still holds an expired item.
///
/// Returns true if a file was removed. A record replaced since the caller
/// last read it is left alone.
fn remove_if_expired<S: Serializer>(
    path: &Path,
    serializer: &S,
    writes: &Mutex<()>,
) -> Result<bool> {
    let _guard = lock_writes(writes);

    match read_item_blocking(path, serializer) {
        Ok(item) if item.is_expired() => {}
        Ok(_) | Err(CacheError::Miss) => return Ok(false),
        Err(e) => return Err(e),
    }

    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// One blocking pass over the whole tree under `base_dir`.
fn sweep_tree<S: Serializer>(base_dir: &Path, serializer: &S, writes: &Mutex<()>) -> usize {
    let mut removed = 0;

    // Gone after clear_all until the next put
    if !base_dir.exists() {
        return removed;
    }

    for entry in WalkDir::new(base_dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path during trash gc");
                continue;
            }
        };

        let in_flight = entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX);
        if !entry.file_type().is_file() || in_flight {
            continue;
        }

        let path = entry.path();
        let item = match read_item_blocking(path, serializer) {
            Ok(item) => item,
            Err(CacheError::Miss) => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping entry during trash gc");
                continue;
            }
        };

        if item.is_expired() {
            match remove_if_expired(path, serializer, writes) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove expired entry");
                }
            }
        }
    }

    removed
}

struct FileInner<S> {
    base_dir: PathBuf,
    /// Shared with blocking work
    serializer: Arc<S>,
    writes: WriteLock,
}

impl<S: Serializer> FileInner<S> {
    /// Maps a key to `<base>/<h[0:2]>/<h[2:4]>/<h[4:6]>/<h>`, `h` being the
    /// hex SHA-256 of the key.
    fn file_path_for_key(&self, key: &str) -> PathBuf {
        let hash = hex::encode(Sha256::digest(key.as_bytes()));

        self.base_dir
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(&hash[4..6])
            .join(&hash)
    }

    /// Reads and decodes the item at `path`. A missing file is a miss.
    async fn read_item(&self, path: &Path) -> Result<CacheItem> {
        let bytes = tokio::fs::read(path).await.map_err(map_read_error)?;
        self.serializer.deserialize(&bytes)
    }

    /// Removes the entry at `path` unless a fresh record replaced it.
    async fn evict_if_expired(&self, path: PathBuf) -> Result<bool> {
        let serializer = Arc::clone(&self.serializer);
        let writes = Arc::clone(&self.writes);

        run_blocking(move || remove_if_expired(&path, serializer.as_ref(), &writes)).await
    }
}

#[async_trait]
impl<S: Serializer> Sweep for FileInner<S> {
    async fn sweep(&self) -> usize {
        let base_dir = self.base_dir.clone();
        let serializer = Arc::clone(&self.serializer);
        let writes = Arc::clone(&self.writes);

        match tokio::task::spawn_blocking(move || {
            sweep_tree(&base_dir, serializer.as_ref(), &writes)
        })
        .await
        {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "File trash gc pass did not complete");
                0
            }
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

// == File Store ==
/// Filesystem cache store. Every key lives in its own file.
pub struct FileStore<S: Serializer = JsonSerializer> {
    inner: Arc<FileInner<S>>,
    gc: TrashGc,
}

impl FileStore<JsonSerializer> {
    // == Constructor ==
    /// Opens a store rooted at `base_dir`, creating the directory if needed,
    /// and starts its trash gc loop.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns [`CacheError::Misconfiguration`] if the base directory cannot
    /// be created. Callers treat this as fatal.
    pub fn new(base_dir: impl Into<PathBuf>, gc_interval: Duration) -> Result<Self> {
        Self::with_serializer(base_dir, gc_interval, JsonSerializer)
    }
}

impl<S: Serializer> FileStore<S> {
    /// Opens a store using the given serializer.
    pub fn with_serializer(
        base_dir: impl Into<PathBuf>,
        gc_interval: Duration,
        serializer: S,
    ) -> Result<Self> {
        let base_dir = base_dir.into();

        std::fs::create_dir_all(&base_dir).map_err(|e| {
            CacheError::Misconfiguration(format!(
                "Base directory [{}] could not be created: {}",
                base_dir.display(),
                e
            ))
        })?;

        let inner = Arc::new(FileInner {
            base_dir,
            serializer: Arc::new(serializer),
            writes: WriteLock::default(),
        });
        let gc = spawn_trash_gc(inner.clone(), gc_interval);

        Ok(Self { inner, gc })
    }

    /// Root of the store's directory tree.
    pub fn base_dir(&self) -> &Path {
        &self.inner.base_dir
    }

    /// Path of the file backing `key`.
    pub fn file_path_for_key(&self, key: &str) -> PathBuf {
        self.inner.file_path_for_key(key)
    }

    /// Stops the trash gc loop. Also happens on drop.
    pub fn close(&self) {
        self.gc.stop();
    }
}

#[async_trait]
impl<S: Serializer> Cache for FileStore<S> {
    async fn put(&self, key: &str, data: Vec<u8>, ttl: Ttl) -> Result<()> {
        let path = self.inner.file_path_for_key(key);

        let item = CacheItem::new(data, ttl);
        let record = self.inner.serializer.serialize(&item)?;

        let target = path.clone();
        let writes = Arc::clone(&self.inner.writes);
        run_blocking(move || write_record(&target, &record, &writes)).await?;
        debug!(key, path = %path.display(), "Stored entry");

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.inner.file_path_for_key(key);
        let item = self.inner.read_item(&path).await?;

        if item.is_expired() {
            match self.inner.evict_if_expired(path).await {
                Ok(true) => debug!(key, "Evicted expired entry on read"),
                Ok(false) => {}
                Err(e) => warn!(key, error = %e, "Failed to remove expired entry on read"),
            }
            return Err(CacheError::Miss);
        }

        Ok(item.data)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.inner.file_path_for_key(key)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let path = self.inner.file_path_for_key(key);

        match self.inner.read_item(&path).await {
            Ok(item) => !item.is_expired(),
            Err(_) => false,
        }
    }

    async fn clear_all(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.inner.base_dir).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINUTE: Ttl = Ttl::After(Duration::from_secs(60));

    fn store(dir: &TempDir) -> FileStore {
        FileStore::new(dir.path().join("cache"), Duration::from_secs(60)).unwrap()
    }

    #[tokio::test]
    async fn test_new_creates_base_dir() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("a").join("b");

        let store = FileStore::new(&base, Duration::from_secs(60)).unwrap();

        assert!(base.is_dir());
        assert_eq!(store.base_dir(), base.as_path());
    }

    #[tokio::test]
    async fn test_new_fails_when_base_dir_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let result = FileStore::new(blocker.join("cache"), Duration::from_secs(60));
        assert!(matches!(result, Err(CacheError::Misconfiguration(_))));
    }

    #[tokio::test]
    async fn test_file_path_layout() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let hash = hex::encode(Sha256::digest(b"file_sys"));
        let expected = store
            .base_dir()
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(&hash[4..6])
            .join(&hash);

        assert_eq!(store.file_path_for_key("file_sys"), expected);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash.to_lowercase());
    }

    #[tokio::test]
    async fn test_file_path_deterministic_and_distinct() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert_eq!(
            store.file_path_for_key("user:1"),
            store.file_path_for_key("user:1")
        );
        assert_ne!(
            store.file_path_for_key("user:1"),
            store.file_path_for_key("user:2")
        );
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.put("file_sys", b"file store".to_vec(), MINUTE).await.unwrap();

        assert!(store.file_path_for_key("file_sys").is_file());
        assert_eq!(store.get("file_sys").await.unwrap(), b"file store");
        assert!(store.exists("file_sys").await);
    }

    #[tokio::test]
    async fn test_get_unknown_key_is_miss() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let result = store.get("UnknownKey").await;
        assert!(matches!(result, Err(CacheError::Miss)));
        assert!(!store.exists("UnknownKey").await);
    }

    #[tokio::test]
    async fn test_get_expired_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.put("stale", b"v".to_vec(), Ttl::Expired).await.unwrap();
        let path = store.file_path_for_key("stale");
        assert!(path.is_file());

        assert!(matches!(store.get("stale").await, Err(CacheError::Miss)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_get_corrupt_file_is_decoding_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let path = store.file_path_for_key("broken");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"\x00garbage").unwrap();

        assert!(matches!(store.get("broken").await, Err(CacheError::Decoding(_))));
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.put("k", b"v".to_vec(), MINUTE).await.unwrap();
        store.delete("k").await.unwrap();

        assert!(!store.file_path_for_key("k").exists());
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_all_then_put_recreates_tree() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.put("a", b"1".to_vec(), MINUTE).await.unwrap();
        store.clear_all().await.unwrap();

        assert!(!store.base_dir().exists());
        assert!(matches!(store.get("a").await, Err(CacheError::Miss)));

        store.clear_all().await.unwrap();
        store.put("b", b"2".to_vec(), MINUTE).await.unwrap();
        assert_eq!(store.get("b").await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_and_skips_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.put("gone", b"v".to_vec(), Ttl::Expired).await.unwrap();
        store.put("kept", b"v".to_vec(), MINUTE).await.unwrap();
        let corrupt = store.file_path_for_key("corrupt");
        std::fs::create_dir_all(corrupt.parent().unwrap()).unwrap();
        std::fs::write(&corrupt, b"not json").unwrap();

        let removed = store.inner.sweep().await;

        assert_eq!(removed, 1);
        assert!(!store.file_path_for_key("gone").exists());
        assert!(store.file_path_for_key("kept").exists());
        assert!(corrupt.exists());
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.put("k", b"v1".to_vec(), MINUTE).await.unwrap();
        store.put("k", b"v2".to_vec(), MINUTE).await.unwrap();

        let shard = store.file_path_for_key("k");
        let entries: Vec<_> = std::fs::read_dir(shard.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries, vec![shard]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overwrite_while_reading_never_tears() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));
        let first = vec![1u8; 256 * 1024];
        let second = vec![2u8; 256 * 1024];
        store.put("k", first.clone(), MINUTE).await.unwrap();

        let writer = {
            let store = Arc::clone(&store);
            let (first, second) = (first.clone(), second.clone());
            tokio::spawn(async move {
                for i in 0..100 {
                    let data = if i % 2 == 0 { second.clone() } else { first.clone() };
                    store.put("k", data, MINUTE).await.unwrap();
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            let (first, second) = (first.clone(), second.clone());
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let data = store.get("k").await.unwrap();
                    assert!(data == first || data == second);
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_eviction_keeps_replaced_record() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.put("k", b"old".to_vec(), Ttl::Expired).await.unwrap();
        let path = store.file_path_for_key("k");
        // Replaced between the expired read and the removal
        store.put("k", b"new".to_vec(), MINUTE).await.unwrap();

        assert!(!store.inner.evict_if_expired(path.clone()).await.unwrap());
        assert!(path.exists());
        assert_eq!(store.get("k").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_eviction_removes_still_expired_record() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.put("k", b"old".to_vec(), Ttl::Expired).await.unwrap();
        let path = store.file_path_for_key("k");

        assert!(store.inner.evict_if_expired(path.clone()).await.unwrap());
        assert!(!path.exists());
        assert!(!store.inner.evict_if_expired(path).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_skips_in_flight_writes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let shard = store.base_dir().join("aa").join("bb").join("cc");
        std::fs::create_dir_all(&shard).unwrap();
        let partial = shard.join(format!("{}partial", TEMP_PREFIX));
        std::fs::write(&partial, b"{\"created_time\"").unwrap();

        assert_eq!(store.inner.sweep().await, 0);
        assert!(partial.exists());
    }
}
