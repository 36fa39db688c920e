//! Region geometry resolution.
//!
//! Turns a [`DecodeRequest`] plus probed [`ImageMetadata`] into the exact
//! parameters an engine consumes. Everything here is pure and deterministic.
//!
//! The reduction factor is always computed first: integer height/width
//! coordinates are measured against the already-reduced raster, so region
//! normalization depends on it.

use crate::format::ImageMetadata;

use super::request::{Coordinate, DecodeRequest, Rotation};

/// Smallest long-side dimension that still counts as a resolution level.
pub const MIN_LEVEL_DIMENSION: u32 = 96;

// =============================================================================
// Resolved Parameters
// =============================================================================

/// Fractional region box as consumed by the engine: `[top, left, height, width]`.
pub type RegionBox = [f64; 4];

/// Concrete decoder parameters derived from a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParameters {
    /// Normalized region, or `None` for the full image
    pub region: Option<RegionBox>,

    /// Number of decomposition levels to discard
    pub reduce: u32,

    pub rotation: Rotation,

    /// Compositing layer (0 = default)
    pub layer: u32,
}

impl ResolvedParameters {
    /// Parameters for a request that needs no metadata (full image).
    pub fn without_metadata(request: &DecodeRequest) -> Self {
        Self {
            region: None,
            reduce: request.reduce.unwrap_or(0),
            rotation: request.rotation,
            layer: request.layer,
        }
    }
}

// =============================================================================
// Level Arithmetic
// =============================================================================

/// Number of resolution levels exposed for an image of the given size.
///
/// Counts how many times the long side is halved while it is still larger
/// than [`MIN_LEVEL_DIMENSION`]. The comparison is strict: a long side of
/// exactly 96 yields zero levels, not one.
pub fn available_levels(width: u32, height: u32) -> u32 {
    let mut l = width.max(height);
    let mut levels = 0;
    while l > MIN_LEVEL_DIMENSION {
        l /= 2;
        levels += 1;
    }
    levels
}

/// Level whose raster is the smallest one still covering `out_w` x `out_h`.
pub fn scaling_level(width: u32, height: u32, out_w: u32, out_h: u32) -> u32 {
    let levels = available_levels(width, height) as i64;
    let max_out = out_w.max(out_h).max(1);
    let mut r = levels + 2;
    let mut i = width.max(height);
    while i >= max_out {
        i /= 2;
        r -= 1;
    }
    r.max(0) as u32
}

/// Reduction factor for a target level, capped by what the codestream holds.
pub fn reduce_for_level(metadata: &ImageMetadata, level: u32) -> u32 {
    let levels = metadata
        .levels
        .min(available_levels(metadata.width, metadata.height));
    levels.saturating_sub(level)
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolve a request against the image it targets.
pub fn resolve(request: &DecodeRequest, metadata: &ImageMetadata) -> ResolvedParameters {
    let reduce = if let Some(level) = request.level {
        reduce_for_level(metadata, level)
    } else if let Some((out_w, out_h)) = request.fit {
        let level = scaling_level(metadata.width, metadata.height, out_w, out_h);
        reduce_for_level(metadata, level)
    } else {
        request.reduce.unwrap_or(0)
    };

    let region = request.region.map(|region| {
        let full_h = metadata.height.max(1) as f64;
        let full_w = metadata.width.max(1) as f64;
        let scale = 2f64.powi(reduce.min(i32::MAX as u32) as i32);
        let reduced_h = full_h / scale;
        let reduced_w = full_w / scale;

        [
            normalize(region.top, full_h),
            normalize(region.left, full_w),
            normalize(region.height, reduced_h),
            normalize(region.width, reduced_w),
        ]
    });

    ResolvedParameters {
        region,
        reduce,
        rotation: request.rotation,
        layer: request.layer,
    }
}

fn normalize(coordinate: Coordinate, dimension: f64) -> f64 {
    match coordinate {
        Coordinate::Fraction(f) => f,
        Coordinate::Pixels(p) => p as f64 / dimension,
    }
}
