//! Decoded pixel buffers.
//!
//! Every engine hands back a [`Raster`]: interleaved 8-bit samples with one
//! (gray) or three (RGB) channels. Engines that cannot rotate natively apply
//! [`Raster::rotate`] after decoding.

mod pnm;

pub use pnm::parse_pnm;

use bytes::Bytes;
use image::{DynamicImage, GrayImage, RgbImage};

use crate::error::ExtractError;
use crate::region::Rotation;

/// Interleaved 8-bit pixel data.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    channels: u8,
    data: Bytes,
}

impl Raster {
    /// Wrap pixel data, checking that its length matches the geometry.
    pub fn new(width: u32, height: u32, channels: u8, data: Bytes) -> Result<Self, ExtractError> {
        if channels != 1 && channels != 3 {
            return Err(ExtractError::InvalidRaster(format!(
                "unsupported channel count {}",
                channels
            )));
        }
        let expected = sample_count(width, height, channels).ok_or_else(|| {
            ExtractError::InvalidRaster(format!("{}x{} raster is too large", width, height))
        })?;
        if data.len() != expected {
            return Err(ExtractError::InvalidRaster(format!(
                "{}x{}x{} raster needs {} bytes, got {}",
                width,
                height,
                channels,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Rotate clockwise by a quarter-turn multiple.
    pub fn rotate(self, rotation: Rotation) -> Raster {
        if rotation == Rotation::None || self.data.is_empty() {
            return self;
        }

        let (w, h, c) = (
            self.width as usize,
            self.height as usize,
            self.channels as usize,
        );
        let (out_w, out_h) = match rotation {
            Rotation::Deg90 | Rotation::Deg270 => (h, w),
            _ => (w, h),
        };

        let mut out = vec![0u8; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let (nx, ny) = match rotation {
                    Rotation::Deg90 => (h - 1 - y, x),
                    Rotation::Deg180 => (w - 1 - x, h - 1 - y),
                    Rotation::Deg270 => (y, w - 1 - x),
                    Rotation::None => (x, y),
                };
                let src = (y * w + x) * c;
                let dst = (ny * out_w + nx) * c;
                out[dst..dst + c].copy_from_slice(&self.data[src..src + c]);
            }
        }

        Raster {
            width: out_w as u32,
            height: out_h as u32,
            channels: self.channels,
            data: Bytes::from(out),
        }
    }

    /// Convert into an `image` buffer for encoding.
    pub fn into_dynamic_image(self) -> Result<DynamicImage, ExtractError> {
        let (width, height) = (self.width, self.height);
        let data = self.data.to_vec();
        let image = match self.channels {
            1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            _ => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        };
        image.ok_or_else(|| {
            ExtractError::InvalidRaster(format!("{}x{} buffer size mismatch", width, height))
        })
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Interleaved sample count, or `None` if it does not fit in memory.
pub(crate) fn sample_count(width: u32, height: u32, channels: u8) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(channels as usize)
}
