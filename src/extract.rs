//! Region extraction pipeline.
//!
//! ```text
//! DecodeRequest ──► signature check ──► probe? ──► resolve ──► engine.decode ──► Raster
//!                   (fail fast)         (only for region, level or fit)
//! ```
//!
//! Requests arrive already validated (parsing a [`DecodeRequest`] is where
//! malformed input is rejected), and the signature is checked before any
//! engine work, so bad input never costs a process spawn.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::engine::DecodeEngine;
use crate::error::ExtractError;
use crate::format::{ImageMetadata, ImageSource};
use crate::raster::Raster;
use crate::region::{resolve, DecodeRequest, ResolvedParameters};

/// Front door to a decoding engine.
#[derive(Clone)]
pub struct Extractor {
    engine: Arc<dyn DecodeEngine>,
}

impl Extractor {
    pub fn new(engine: Arc<dyn DecodeEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &dyn DecodeEngine {
        self.engine.as_ref()
    }

    /// Probe image properties.
    pub async fn probe(&self, source: &ImageSource) -> Result<ImageMetadata, ExtractError> {
        self.engine.probe(source).await
    }

    /// XML box payloads, in file order.
    pub async fn xml_boxes(&self, source: &ImageSource) -> Result<Vec<Bytes>, ExtractError> {
        self.engine.list_xml_boxes(source).await
    }

    /// Resolve a request against a source, probing only when geometry
    /// depends on image size.
    pub async fn resolve(
        &self,
        source: &ImageSource,
        request: &DecodeRequest,
    ) -> Result<ResolvedParameters, ExtractError> {
        if request.needs_metadata() {
            let metadata = self.engine.probe(source).await?;
            Ok(resolve(request, &metadata))
        } else {
            Ok(ResolvedParameters::without_metadata(request))
        }
    }

    /// Decode the requested region of `source`.
    #[instrument(skip_all, fields(source = %source.identity(), engine = self.engine.name()))]
    pub async fn extract(
        &self,
        source: &ImageSource,
        request: &DecodeRequest,
        cancel: &CancellationToken,
    ) -> Result<Raster, ExtractError> {
        source.verify().await?;

        let params = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
            params = self.resolve(source, request) => params?,
        };
        debug!(
            reduce = params.reduce,
            region = ?params.region,
            rotation = params.rotation.degrees(),
            layer = params.layer,
            "Resolved decode parameters"
        );

        self.engine.decode(source, &params, cancel).await
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("engine", &self.engine.name())
            .finish()
    }
}
