use serde::Serialize;

/// Properties of a JPEG 2000 image needed before decoding a region.
///
/// Produced once per request by an engine probe and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageMetadata {
    /// Full-resolution width in pixels
    pub width: u32,

    /// Full-resolution height in pixels
    pub height: u32,

    /// Number of wavelet decomposition levels in the codestream
    pub levels: u32,

    /// Bit precision of the first component
    pub bit_depth: u32,

    /// Number of image components
    pub channels: u32,

    /// Number of quality layers
    pub quality_layers: u32,

    /// Number of compositing layers (1 for plain JP2)
    pub compositing_layers: u32,
}
