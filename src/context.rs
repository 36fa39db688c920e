//! Process-wide imaging services.
//!
//! [`ImagingContext`] owns everything with a lifetime longer than a request:
//! the extractor, the identifier resolver, the tile cache and the pool that
//! deletes evicted tiles. It is built once at startup and torn down with
//! [`ImagingContext::shutdown`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::engine::DecodeEngine;
use crate::error::TileError;
use crate::extract::Extractor;
use crate::referent::ReferentResolver;
use crate::tile::{
    FileDeletePool, TileCache, TileService, DEFAULT_DELETE_WORKERS, DEFAULT_JPEG_QUALITY,
    DEFAULT_TILE_CACHE_CAPACITY,
};

/// Tile cache settings.
#[derive(Debug, Clone)]
pub struct TileOptions {
    /// Directory rendered tiles are written to
    pub cache_dir: PathBuf,

    /// Maximum number of indexed tiles
    pub capacity: usize,

    /// Concurrent deletions of evicted tiles
    pub delete_workers: usize,

    /// Quality used when a request does not name one
    pub default_quality: u8,
}

impl TileOptions {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            capacity: DEFAULT_TILE_CACHE_CAPACITY,
            delete_workers: DEFAULT_DELETE_WORKERS,
            default_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_delete_workers(mut self, workers: usize) -> Self {
        self.delete_workers = workers;
        self
    }

    pub fn with_default_quality(mut self, quality: u8) -> Self {
        self.default_quality = quality;
        self
    }
}

/// Startup/teardown registry for the imaging services.
pub struct ImagingContext {
    resolver: Arc<dyn ReferentResolver>,
    tiles: TileService,
    delete_pool: Arc<FileDeletePool>,
    default_quality: u8,
}

impl ImagingContext {
    /// Create the cache directory and start the deletion pool.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn start(
        engine: Arc<dyn DecodeEngine>,
        resolver: Arc<dyn ReferentResolver>,
        options: TileOptions,
    ) -> Result<Self, TileError> {
        tokio::fs::create_dir_all(&options.cache_dir)
            .await
            .map_err(|e| TileError::Storage {
                message: format!("{}: {}", options.cache_dir.display(), e),
            })?;

        let delete_pool = Arc::new(FileDeletePool::new(options.delete_workers));
        let cache = Arc::new(TileCache::new(options.capacity, delete_pool.clone()));
        let extractor = Extractor::new(engine);
        let tiles = TileService::new(extractor, cache, &options.cache_dir);

        info!(
            engine = tiles.extractor().engine().name(),
            cache_dir = %options.cache_dir.display(),
            capacity = options.capacity,
            delete_workers = options.delete_workers,
            "Imaging context started"
        );

        Ok(Self {
            resolver,
            tiles,
            delete_pool,
            default_quality: options.default_quality,
        })
    }

    pub fn extractor(&self) -> &Extractor {
        self.tiles.extractor()
    }

    pub fn resolver(&self) -> &dyn ReferentResolver {
        self.resolver.as_ref()
    }

    pub fn tiles(&self) -> &TileService {
        &self.tiles
    }

    pub fn cache(&self) -> &TileCache {
        self.tiles.cache()
    }

    pub fn delete_pool(&self) -> &FileDeletePool {
        &self.delete_pool
    }

    pub fn default_quality(&self) -> u8 {
        self.default_quality
    }

    /// Finish pending tile deletions and stop the pool.
    pub async fn shutdown(&self) {
        self.delete_pool.shutdown().await;
        info!(
            deleted = self.delete_pool.stats().deleted(),
            failed = self.delete_pool.stats().failed(),
            "Imaging context stopped"
        );
    }
}

impl std::fmt::Debug for ImagingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagingContext")
            .field("tiles", &self.tiles)
            .field("default_quality", &self.default_quality)
            .finish()
    }
}
