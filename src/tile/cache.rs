//! Tile cache index.
//!
//! Maps a request fingerprint to the path of a rendered tile on disk. The
//! index is bounded by entry count; every `put` that pushes it past capacity
//! evicts exactly one least-recently-used entry and hands it to an
//! [`EvictionListener`], which reclaims the file off the request path.
//!
//! # Cache Key
//!
//! Tiles are identified by a composite key covering everything that changes
//! the rendered bytes:
//! - Source identity (file path or stream id)
//! - Region, level and reduce as requested
//! - Rotation and compositing layer
//! - JPEG quality
//!
//! The key is reduced to a hex SHA-256 fingerprint, which is also the tile's
//! file stem.
//!
//! The index lives only as long as the process. Files from a previous run
//! stay on disk but are not re-indexed.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::region::{DecodeRequest, Rotation};

/// Default capacity: number of tiles indexed.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 1000;

// =============================================================================
// Cache Key
// =============================================================================

/// Everything that determines a rendered tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Source identity (path or stream id)
    pub source: Arc<str>,

    /// Canonical region text, `None` for the full image
    pub region: Option<String>,

    pub level: Option<u32>,

    pub reduce: Option<u32>,

    pub fit: Option<(u32, u32)>,

    pub rotation: Rotation,

    pub layer: u32,

    /// JPEG quality (1-100)
    pub quality: u8,
}

impl TileCacheKey {
    /// Key for a request against a source.
    pub fn new(source: impl Into<Arc<str>>, request: &DecodeRequest, quality: u8) -> Self {
        Self {
            source: source.into(),
            region: request.region.map(|r| r.to_string()),
            level: request.level,
            reduce: request.reduce,
            fit: request.fit,
            rotation: request.rotation,
            layer: request.layer,
            quality,
        }
    }

    /// Deterministic hex fingerprint of the key.
    pub fn fingerprint(&self) -> String {
        fn opt<T: std::fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map(|v| v.to_string()).unwrap_or_default()
        }

        let fit = self
            .fit
            .map(|(w, h)| format!("{}x{}", w, h))
            .unwrap_or_default();
        let canonical = format!(
            "{}|region={}|level={}|reduce={}|fit={}|rotate={}|layer={}|q={}",
            self.source,
            opt(&self.region),
            opt(&self.level),
            opt(&self.reduce),
            fit,
            self.rotation.degrees(),
            self.layer,
            self.quality
        );
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

// =============================================================================
// Eviction Listener
// =============================================================================

/// Receives entries the cache has dropped.
///
/// Called after the in-memory removal has happened and outside the cache
/// lock; implementations must not block.
pub trait EvictionListener: Send + Sync {
    fn on_evict(&self, key: String, path: PathBuf);
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Bounded LRU index from fingerprint to tile file.
///
/// One lock covers lookups, inserts, removals and the eviction check.
pub struct TileCache {
    entries: Mutex<LruCache<String, PathBuf>>,
    capacity: NonZeroUsize,
    listener: Arc<dyn EvictionListener>,
}

impl TileCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, listener: Arc<dyn EvictionListener>) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            listener,
        }
    }

    /// Look up a tile path, marking the entry most recently used.
    pub async fn get(&self, key: &str) -> Option<PathBuf> {
        let mut entries = self.entries.lock().await;
        entries.get(key).cloned()
    }

    /// Check for an entry without touching LRU order.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains(key)
    }

    /// Insert or replace an entry.
    ///
    /// A replaced entry's file, when it differs from the new one, goes to
    /// the listener. If the cache is now over capacity, the single
    /// least-recently-used entry is evicted and passed to the listener.
    pub async fn put(&self, key: String, path: PathBuf) {
        let (superseded, evicted) = {
            let mut entries = self.entries.lock().await;
            let superseded = entries
                .push(key, path.clone())
                .filter(|(_, old)| *old != path);
            let evicted = if entries.len() > self.capacity.get() {
                entries.pop_lru()
            } else {
                None
            };
            (superseded, evicted)
        };

        if let Some((key, old)) = superseded {
            debug!(key = %key, path = %old.display(), "Replacing tile file");
            self.listener.on_evict(key, old);
        }
        if let Some((key, path)) = evicted {
            debug!(key = %key, path = %path.display(), "Evicting tile");
            self.listener.on_evict(key, path);
        }
    }

    /// Remove an entry and delete its file.
    ///
    /// A missing key or an already-deleted file is not an error; other
    /// deletion failures are logged.
    pub async fn remove(&self, key: &str) -> Option<PathBuf> {
        let removed = self.entries.lock().await.pop(key);
        if let Some(path) = &removed {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(key = %key, path = %path.display(), "Removed tile"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    key = %key,
                    path = %path.display(),
                    error = %e,
                    "Failed to delete tile file"
                ),
            }
        }
        removed
    }

    /// Drop every entry. Tile files are left on disk.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

// =============================================================================
// Tests
// =============================================================================
