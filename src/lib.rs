//! # JP2 Streamer
//!
//! Region extraction and tile caching for JPEG 2000 images.
//!
//! The wavelet decode is delegated to an engine: either an external expand
//! executable driven over pipes or temp files, or the in-process OpenJPEG
//! binding. Around it, this crate resolves region requests into decoder
//! parameters, probes image metadata, and caches rendered JPEG tiles on disk
//! behind a bounded LRU index.
//!
//! ## Architecture
//!
//! - [`region`] - Region parsing and resolution-level geometry
//! - [`mod@format`] - JP2 signature, container reader and image sources
//! - [`engine`] - Decoding engines and the decoder process adapter
//! - [`raster`] - Decoded pixels and PNM parsing
//! - [`extract`] - The extraction pipeline
//! - [`tile`] - Tile cache, eviction and rendering
//! - [`referent`] - Identifier to source resolution
//! - [`context`] - Startup/teardown of the shared services
//! - [`server`] - Axum HTTP routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use jp2_streamer::{DecodeRequest, Extractor, ImageSource, NativeEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extractor = Extractor::new(Arc::new(NativeEngine::new()));
//!     let source = ImageSource::file("page.jp2");
//!     let request = DecodeRequest::new()
//!         .with_region("0,0,512,512".parse()?)
//!         .with_level(2);
//!     let raster = extractor
//!         .extract(&source, &request, &CancellationToken::new())
//!         .await?;
//!     println!("{}x{}", raster.width(), raster.height());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod extract;
pub mod format;
pub mod raster;
pub mod referent;
pub mod region;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, EngineArgs, ExtractConfig, InspectConfig, ServeConfig};
pub use context::{ImagingContext, TileOptions};
pub use engine::{
    DecodeEngine, EngineKind, NativeEngine, OutputStrategy, ProcessAdapter, ProcessConfig,
    ProcessEngine,
};
pub use error::{ExtractError, Jp2Error, RegionError, TileError};
pub use extract::Extractor;
pub use format::{ImageMetadata, ImageSource};
pub use raster::Raster;
pub use referent::{DirectoryResolver, ReferentResolver};
pub use region::{DecodeRequest, Region, ResolvedParameters, Rotation};
pub use server::{create_router, AppState, RouterConfig};
pub use tile::{
    EvictionListener, FileDeletePool, JpegTileEncoder, TileCache, TileCacheKey, TileRequest,
    TileResponse, TileService,
};
