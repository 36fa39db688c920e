//! Asynchronous tile file deletion.
//!
//! Evicted tiles are queued here instead of being unlinked inside the cache
//! lock. A dispatcher task drains the queue and runs deletions with at most
//! `workers` in flight at once:
//!
//! ```text
//! TileCache::put ──on_evict──► [unbounded queue] ──► dispatcher ──► ≤ N deletions
//! ```
//!
//! The queue itself is unbounded, so a sustained burst of evictions grows it
//! without limit; worker concurrency is what stays bounded.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::cache::EvictionListener;

/// Default number of concurrent deletions.
pub const DEFAULT_DELETE_WORKERS: usize = 10;

/// Counters for deletion outcomes.
#[derive(Debug, Default)]
pub struct DeleteStats {
    deleted: AtomicU64,
    missing: AtomicU64,
    failed: AtomicU64,
    pending: AtomicU64,
}

impl DeleteStats {
    /// Files removed.
    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    /// Files that were already gone.
    pub fn missing(&self) -> u64 {
        self.missing.load(Ordering::Relaxed)
    }

    /// Deletions that failed for another reason.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Queued or in-flight deletions.
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Bounded pool that deletes evicted tile files.
///
/// Must be created inside a Tokio runtime.
pub struct FileDeletePool {
    tx: mpsc::UnboundedSender<PathBuf>,
    stats: Arc<DeleteStats>,
    idle: Arc<Notify>,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl FileDeletePool {
    /// Start a pool running at most `workers` deletions at once (minimum 1).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(DeleteStats::default());
        let idle = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let dispatcher = tokio::spawn(dispatch(
            rx,
            workers,
            stats.clone(),
            idle.clone(),
            shutdown.clone(),
        ));

        Self {
            tx,
            stats,
            idle,
            shutdown,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    pub fn stats(&self) -> &DeleteStats {
        &self.stats
    }

    /// Queue a file for deletion.
    pub fn schedule(&self, path: PathBuf) {
        self.stats.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(path)) = self.tx.send(path) {
            self.stats.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(path = %path.display(), "Delete pool is shut down, leaving tile file");
        }
    }

    /// Wait until every queued deletion has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.stats.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting work, finish what is queued, and stop the dispatcher.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let dispatcher = self.dispatcher.lock().ok().and_then(|mut d| d.take());
        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.await {
                warn!(error = %e, "Delete pool dispatcher ended abnormally");
            }
        }
    }
}

impl EvictionListener for FileDeletePool {
    fn on_evict(&self, _key: String, path: PathBuf) {
        self.schedule(path);
    }
}

impl Drop for FileDeletePool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    workers: usize,
    stats: Arc<DeleteStats>,
    idle: Arc<Notify>,
    shutdown: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut closing = false;

    loop {
        let next = tokio::select! {
            path = rx.recv() => path,
            _ = shutdown.cancelled(), if !closing => {
                // Drain what is already queued, accept nothing new
                rx.close();
                closing = true;
                continue;
            }
        };
        let Some(path) = next else { break };

        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let stats = stats.clone();
        let idle = idle.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    stats.deleted.fetch_add(1, Ordering::Relaxed);
                    debug!(path = %path.display(), "Deleted evicted tile");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    stats.missing.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(path = %path.display(), error = %e, "Failed to delete evicted tile");
                }
            }
            if stats.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle.notify_waiters();
            }
        });
    }

    // Wait for in-flight deletions
    let _ = permits.acquire_many(workers as u32).await;
    debug!("Delete pool stopped");
}
