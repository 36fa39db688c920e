//! In-process engine built on the OpenJPEG binding.
//!
//! Metadata comes from the native container reader, so probing never touches
//! the decoder. Decodes run on the blocking pool; a cancelled decode returns
//! immediately and the blocking result is discarded when it lands.

use async_trait::async_trait;
use bytes::Bytes;
use jpeg2k::{DecodeArea, DecodeParameters, Image};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::format::{jp2, ImageMetadata, ImageSource};
use crate::raster::Raster;
use crate::region::{RegionBox, ResolvedParameters};

use super::DecodeEngine;

/// [`DecodeEngine`] that decodes with the linked OpenJPEG library.
#[derive(Debug, Clone, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecodeEngine for NativeEngine {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn probe(&self, source: &ImageSource) -> Result<ImageMetadata, ExtractError> {
        source.verify().await?;
        let data = source.read_all().await?;
        Ok(jp2::read_metadata(&data)?)
    }

    async fn decode(
        &self,
        source: &ImageSource,
        params: &ResolvedParameters,
        cancel: &CancellationToken,
    ) -> Result<Raster, ExtractError> {
        let data = source.read_all().await?;
        let metadata = jp2::read_metadata(&data)?;

        if params.layer > 0 {
            warn!(
                source = %source.identity(),
                layer = params.layer,
                "Native engine decodes the default compositing layer only"
            );
        }

        let area = params
            .region
            .map(|region| decode_area(&region, metadata.width, metadata.height));
        let reduce = params.reduce;
        let task = tokio::task::spawn_blocking(move || decode_blocking(data, reduce, area));

        let raster = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
            joined = task => joined.map_err(|e| ExtractError::Io {
                context: "native decode task",
                message: e.to_string(),
            })??,
        };

        debug!(
            source = %source.identity(),
            width = raster.width(),
            height = raster.height(),
            reduce,
            "Decoded region natively"
        );
        Ok(raster.rotate(params.rotation))
    }
}

/// Map a fractional `[top, left, height, width]` box onto the full-resolution
/// grid as `[x0, y0, x1, y1]`, clamped to the image and at least one pixel.
pub(crate) fn decode_area(region: &RegionBox, width: u32, height: u32) -> [u32; 4] {
    let (w, h) = (width as f64, height as f64);
    let [top, left, rh, rw] = *region;

    let x0 = ((left * w).round() as u32).min(width.saturating_sub(1));
    let y0 = ((top * h).round() as u32).min(height.saturating_sub(1));
    let x1 = (((left + rw) * w).round() as u32).clamp(x0 + 1, width.max(x0 + 1));
    let y1 = (((top + rh) * h).round() as u32).clamp(y0 + 1, height.max(y0 + 1));
    [x0, y0, x1, y1]
}

fn decode_blocking(
    data: Bytes,
    reduce: u32,
    area: Option<[u32; 4]>,
) -> Result<Raster, ExtractError> {
    let mut params = DecodeParameters::new().reduce(reduce);
    if let Some([x0, y0, x1, y1]) = area {
        params = params.decode_area(Some(DecodeArea::new(x0, y0, x1, y1)));
    }

    let image = Image::from_bytes_with(&data, params).map_err(|e| ExtractError::DecodeProcess {
        exit_code: None,
        stderr: e.to_string(),
    })?;

    let planes: Vec<Plane<'_>> = image
        .components()
        .iter()
        .filter(|c| !c.is_alpha())
        .map(|c| Plane {
            width: c.width(),
            height: c.height(),
            precision: c.precision(),
            samples: c.data(),
        })
        .collect();
    planes_to_raster(&planes)
}

/// One decoded component.
struct Plane<'a> {
    width: u32,
    height: u32,
    precision: u32,
    samples: &'a [i32],
}

/// Interleave the first one or three planes into an 8-bit raster.
fn planes_to_raster(planes: &[Plane<'_>]) -> Result<Raster, ExtractError> {
    let used = match planes.len() {
        0 => {
            return Err(ExtractError::InvalidRaster(
                "decoded image has no color components".to_string(),
            ))
        }
        1 | 2 => &planes[..1],
        _ => &planes[..3],
    };

    let (width, height) = (used[0].width, used[0].height);
    let pixels = width as usize * height as usize;
    if used
        .iter()
        .any(|p| p.width != width || p.height != height || p.samples.len() < pixels)
    {
        return Err(ExtractError::InvalidRaster(
            "subsampled components are not supported".to_string(),
        ));
    }

    let mut data = Vec::with_capacity(pixels * used.len());
    for i in 0..pixels {
        for plane in used {
            data.push(to_u8(plane.samples[i], plane.precision));
        }
    }
    Raster::new(width, height, used.len() as u8, Bytes::from(data))
}

fn to_u8(sample: i32, precision: u32) -> u8 {
    let v = sample.max(0) as u32;
    let scaled = match precision {
        0..=7 => v << (8 - precision),
        8 => v,
        p => v >> (p.min(32) - 8),
    };
    scaled.min(255) as u8
}
