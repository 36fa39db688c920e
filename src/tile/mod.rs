//! Tile rendering and caching.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  JPEG Encoder   │  │
//! │  │ (fingerprint │  │ (raster → JPEG) │  │
//! │  │   → file)    │  │                 │  │
//! │  └──────┬───────┘  └─────────────────┘  │
//! └─────────┼──────────────────┬────────────┘
//!           │ evictions        │
//!           ▼                  ▼
//! ┌──────────────────┐ ┌─────────────────────┐
//! │  FileDeletePool  │ │      Extractor      │
//! └──────────────────┘ └─────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: Main entry point for tile requests
//! - [`TileCache`]: Count-bounded LRU index of tile files
//! - [`TileCacheKey`]: Everything that determines a tile, reduced to a fingerprint
//! - [`EvictionListener`]: Receives evicted entries
//! - [`FileDeletePool`]: Deletes evicted files with bounded concurrency
//! - [`JpegTileEncoder`]: Encodes rasters as JPEG

mod cache;
mod encoder;
mod eviction;
mod service;

pub use cache::{EvictionListener, TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use encoder::{
    is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use eviction::{DeleteStats, FileDeletePool, DEFAULT_DELETE_WORKERS};
pub use service::{TileRequest, TileResponse, TileService};
