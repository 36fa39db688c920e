//! JPEG tile encoder.
//!
//! Decoded rasters are 8-bit gray or RGB; both map directly onto baseline
//! JPEG. The quality is chosen per request.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;

use crate::error::TileError;
use crate::raster::Raster;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// JPEG Encoder
// =============================================================================

/// Encodes decoded rasters as JPEG.
///
/// # Example
///
/// ```ignore
/// use jp2_streamer::tile::JpegTileEncoder;
///
/// let encoder = JpegTileEncoder::new();
/// let jpeg = encoder.encode(raster, 85)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct JpegTileEncoder;

impl JpegTileEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a raster at the given quality.
    ///
    /// # Errors
    ///
    /// `InvalidQuality` outside 1-100, `EncodeError` if the raster cannot be
    /// represented or the encoder fails.
    pub fn encode(&self, raster: Raster, quality: u8) -> Result<Bytes, TileError> {
        if !is_valid_quality(quality) {
            return Err(TileError::InvalidQuality { quality });
        }

        let image = raster
            .into_dynamic_image()
            .map_err(|e| TileError::EncodeError {
                message: e.to_string(),
            })?;

        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, quality)
            .encode_image(&image)
            .map_err(|e| TileError::EncodeError {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

// =============================================================================
// Tests
// =============================================================================
