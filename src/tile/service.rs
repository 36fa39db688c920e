//! Tile Service for orchestrating tile generation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Validate quality   4. Extract region                │    │
//! │  │  2. Fingerprint        5. Encode + write tile file      │    │
//! │  │  3. Check cache/file   6. Index & return                │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌──────────────┐    ┌──────────────────┐  │
//! │    │ TileCache │      │  Extractor   │    │ JpegTileEncoder  │  │
//! │    └───────────┘      └──────────────┘    └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rendered tiles live on disk as `<cache_dir>/<fingerprint>-<random>.jpg`;
//! the cache only indexes them. Every render gets its own file, so a
//! deletion queued for an evicted entry never touches a later render of the
//! same tile. An indexed tile whose file has vanished is dropped from the
//! index and rendered again.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::TileError;
use crate::extract::Extractor;
use crate::format::ImageSource;
use crate::raster::Raster;
use crate::region::DecodeRequest;

use super::cache::{TileCache, TileCacheKey};
use super::encoder::{is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY};

// =============================================================================
// Tile Request
// =============================================================================

/// A request for a rendered tile.
#[derive(Debug, Clone)]
pub struct TileRequest {
    /// Image to render from
    pub source: ImageSource,

    /// Region and decode parameters
    pub decode: DecodeRequest,

    /// JPEG quality (1-100, defaults to 80)
    pub quality: u8,
}

impl TileRequest {
    /// Create a tile request with default quality.
    pub fn new(source: ImageSource, decode: DecodeRequest) -> Self {
        Self {
            source,
            decode,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Cache key for this request.
    pub fn cache_key(&self) -> TileCacheKey {
        TileCacheKey::new(self.source.identity(), &self.decode, self.quality)
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The encoded JPEG tile data
    pub data: Bytes,

    /// Fingerprint the tile is cached under
    pub fingerprint: String,

    /// Tile file on disk
    pub path: PathBuf,

    /// Whether this tile was served from cache
    pub cache_hit: bool,

    /// The JPEG quality used for encoding
    pub quality: u8,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Renders tiles through the extractor and caches them on disk.
pub struct TileService {
    extractor: Extractor,
    cache: Arc<TileCache>,
    encoder: JpegTileEncoder,
    cache_dir: PathBuf,
}

impl TileService {
    /// Create a tile service writing tiles into `cache_dir`.
    ///
    /// The directory must exist.
    pub fn new(extractor: Extractor, cache: Arc<TileCache>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            cache,
            encoder: JpegTileEncoder::new(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get a tile, using the cache when its file is still present.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The quality is outside 1-100
    /// - Extraction fails or is cancelled
    /// - The tile cannot be encoded or written
    #[instrument(skip_all, fields(source = %request.source.identity(), quality = request.quality))]
    pub async fn get_tile(
        &self,
        request: &TileRequest,
        cancel: &CancellationToken,
    ) -> Result<TileResponse, TileError> {
        if !is_valid_quality(request.quality) {
            return Err(TileError::InvalidQuality {
                quality: request.quality,
            });
        }

        let fingerprint = request.cache_key().fingerprint();

        if let Some(path) = self.cache.get(&fingerprint).await {
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    debug!(fingerprint = %fingerprint, "Tile cache hit");
                    return Ok(TileResponse {
                        data: Bytes::from(data),
                        fingerprint,
                        path,
                        cache_hit: true,
                        quality: request.quality,
                    });
                }
                Err(e) => {
                    debug!(
                        fingerprint = %fingerprint,
                        error = %e,
                        "Cached tile file unreadable, rendering again"
                    );
                    self.cache.remove(&fingerprint).await;
                }
            }
        }

        let raster = self
            .extractor
            .extract(&request.source, &request.decode, cancel)
            .await?;

        let (data, path) = self.store(raster, request.quality, &fingerprint).await?;
        self.cache.put(fingerprint.clone(), path.clone()).await;
        debug!(fingerprint = %fingerprint, bytes = data.len(), "Rendered tile");

        Ok(TileResponse {
            data,
            fingerprint,
            path,
            cache_hit: false,
            quality: request.quality,
        })
    }

    /// Render a tile without touching the cache.
    pub async fn render(
        &self,
        request: &TileRequest,
        cancel: &CancellationToken,
    ) -> Result<Bytes, TileError> {
        let raster = self
            .extractor
            .extract(&request.source, &request.decode, cancel)
            .await?;
        let encoder = self.encoder.clone();
        let quality = request.quality;
        tokio::task::spawn_blocking(move || encoder.encode(raster, quality))
            .await
            .map_err(|e| TileError::EncodeError {
                message: e.to_string(),
            })?
    }

    /// Encode off the async workers and write a fresh tile file.
    async fn store(
        &self,
        raster: Raster,
        quality: u8,
        fingerprint: &str,
    ) -> Result<(Bytes, PathBuf), TileError> {
        let encoder = self.encoder.clone();
        let dir = self.cache_dir.clone();
        let prefix = format!("{}-", fingerprint);

        tokio::task::spawn_blocking(move || {
            let data = encoder.encode(raster, quality)?;
            let storage = |e: std::io::Error| TileError::Storage {
                message: format!("{}: {}", dir.display(), e),
            };
            let mut file = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(".jpg")
                .tempfile_in(&dir)
                .map_err(storage)?;
            file.write_all(&data).map_err(storage)?;
            let (_, path) = file.keep().map_err(|e| storage(e.error))?;
            Ok((data, path))
        })
        .await
        .map_err(|e| TileError::Storage {
            message: e.to_string(),
        })?
    }
}

impl std::fmt::Debug for TileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileService")
            .field("extractor", &self.extractor)
            .field("cache_dir", &self.cache_dir)
            .field("capacity", &self.cache.capacity())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
