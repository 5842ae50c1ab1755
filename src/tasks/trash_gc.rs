//! Trash GC Task
//!
//! Background task that periodically reclaims expired entries from a store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Interval used when the requested one is below [`MIN_GC_INTERVAL`].
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest interval the loop accepts.
pub const MIN_GC_INTERVAL: Duration = Duration::from_secs(1);

// == Sweep Trait ==
/// A store whose expired entries can be reclaimed in one pass.
#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    /// Removes every expired entry and returns how many were removed.
    async fn sweep(&self) -> usize;

    /// Short store name used in log lines.
    fn name(&self) -> &'static str;
}

/// Returns the interval the loop actually sleeps for.
pub fn effective_interval(interval: Duration) -> Duration {
    if interval < MIN_GC_INTERVAL {
        DEFAULT_GC_INTERVAL
    } else {
        interval
    }
}

// == Trash GC Handle ==
/// Owns a running reclamation loop. Dropping the handle stops the loop.
#[derive(Debug)]
pub struct TrashGc {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl TrashGc {
    /// Signals the loop to stop after its current pass.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Returns true once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TrashGc {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns a background task that sweeps `target` now and then every interval.
///
/// The task sleeps for [`effective_interval`] between passes and exits as
/// soon as the returned handle is stopped or dropped.
///
/// # Arguments
/// * `target` - The store to sweep
/// * `interval` - Requested time between passes
///
/// # Example
/// ```ignore
/// let gc = spawn_trash_gc(inner.clone(), Duration::from_secs(60));
/// // Later, when the store closes:
/// gc.stop();
/// ```
pub fn spawn_trash_gc<T: Sweep>(target: Arc<T>, interval: Duration) -> TrashGc {
    let interval = effective_interval(interval);
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

    let handle = tokio::spawn(async move {
        info!(
            "Starting {} trash gc with interval of {:?}",
            target.name(),
            interval
        );

        loop {
            let removed = target.sweep().await;

            if removed > 0 {
                info!("{} trash gc: removed {} expired entries", target.name(), removed);
            } else {
                debug!("{} trash gc: no expired entries found", target.name());
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.recv() => {
                    info!("{} trash gc stopped", target.name());
                    break;
                }
            }
        }
    });

    TrashGc {
        shutdown_tx,
        handle,
    }
}
