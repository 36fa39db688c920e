//! HTTP request handlers.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /images/{id}/info` - Image metadata
//! - `GET /images/{id}/xml` - XML box payloads
//! - `GET /images/{id}/region` - Rendered JPEG region
//!
//! Identifiers containing `/` must be percent-encoded (`scans%2Fpage1`).

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::context::ImagingContext;
use crate::error::{ExtractError, RegionError, TileError};
use crate::format::ImageMetadata;
use crate::region::{available_levels, DecodeRequest};
use crate::tile::TileRequest;

/// Response header reporting whether a tile came from the cache.
pub const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-tile-cache-hit");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<ImagingContext>,

    /// Cache-Control max-age in seconds for rendered regions
    pub cache_max_age: u32,
}

impl AppState {
    pub fn new(context: Arc<ImagingContext>) -> Self {
        Self {
            context,
            cache_max_age: super::routes::DEFAULT_CACHE_MAX_AGE,
        }
    }

    pub fn with_cache_max_age(context: Arc<ImagingContext>, cache_max_age: u32) -> Self {
        Self {
            context,
            cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for region requests.
///
/// Values are kept as text and validated together so that every malformed
/// parameter produces the same JSON error shape.
#[derive(Debug, Default, Deserialize)]
pub struct RegionQueryParams {
    /// `top,left,height,width`; values with a decimal point are fractions
    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub level: Option<String>,

    #[serde(default)]
    pub reduce: Option<String>,

    /// Output bounding box `width,height` used to choose a level
    #[serde(default)]
    pub fit: Option<String>,

    #[serde(default)]
    pub rotate: Option<String>,

    #[serde(default)]
    pub layer: Option<String>,

    /// JPEG quality (1-100)
    #[serde(default)]
    pub quality: Option<String>,
}

impl RegionQueryParams {
    /// Validate into a decode request.
    pub fn decode_request(&self) -> Result<DecodeRequest, RegionError> {
        let mut request = DecodeRequest::parse(
            self.region.as_deref(),
            self.level.as_deref(),
            self.reduce.as_deref(),
            self.rotate.as_deref(),
            self.layer.as_deref(),
        )?;
        if let Some(fit) = self.fit.as_deref().filter(|f| !f.trim().is_empty()) {
            let (w, h) = parse_fit(fit)?;
            request = request.with_fit(w, h);
        }
        Ok(request)
    }

    /// Requested quality, or `default` when absent.
    pub fn quality(&self, default: u8) -> Result<u8, TileError> {
        match self.quality.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            None => Ok(default),
            Some(q) => q.parse::<u8>().map_err(|_| {
                ExtractError::from(RegionError::InvalidParameter {
                    name: "quality",
                    value: q.to_string(),
                })
                .into()
            }),
        }
    }
}

fn parse_fit(value: &str) -> Result<(u32, u32), RegionError> {
    let invalid = || RegionError::InvalidParameter {
        name: "fit",
        value: value.to_string(),
    };
    let (w, h) = value.split_once(',').ok_or_else(invalid)?;
    let w = w.trim().parse::<u32>().map_err(|_| invalid())?;
    let h = h.trim().parse::<u32>().map_err(|_| invalid())?;
    if w == 0 || h == 0 {
        return Err(invalid());
    }
    Ok((w, h))
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub engine: String,
    pub cached_tiles: usize,
}

/// Image metadata response.
#[derive(Debug, Serialize)]
pub struct ImageInfoResponse {
    pub id: String,

    #[serde(flatten)]
    pub metadata: ImageMetadata,

    /// Levels addressable with `level=` (0..=resolution_levels)
    pub resolution_levels: u32,
}

// =============================================================================
// Error Mapping
// =============================================================================

fn extract_error_parts(err: &ExtractError) -> (StatusCode, &'static str) {
    match err {
        ExtractError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ExtractError::InvalidFormat { .. } => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
        }
        ExtractError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        ExtractError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
        ExtractError::DecodeProcess { .. } | ExtractError::InvalidRaster(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "decode_error")
        }
        ExtractError::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        ExtractError::Configuration(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
        }
    }
}

fn tile_error_parts(err: &TileError) -> (StatusCode, &'static str) {
    match err {
        TileError::Extract(inner) => extract_error_parts(inner),
        TileError::InvalidQuality { .. } => (StatusCode::BAD_REQUEST, "invalid_quality"),
        TileError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        TileError::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
    }
}

/// Build the JSON error response, logging by severity:
/// 5xx at ERROR, 404 at DEBUG, other 4xx at WARN.
fn error_response(status: StatusCode, error_type: &'static str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = tile_error_parts(&self);
        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for ExtractError {
    fn into_response(self) -> Response {
        let (status, error_type) = extract_error_parts(&self);
        error_response(status, error_type, self.to_string())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: state.context.extractor().engine().name().to_string(),
        cached_tiles: state.context.cache().len().await,
    })
}

/// `GET /images/{id}/info`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "id": "scans/page1",
///   "width": 2000, "height": 1000, "levels": 5,
///   "bit_depth": 8, "channels": 3,
///   "quality_layers": 1, "compositing_layers": 1,
///   "resolution_levels": 5
/// }
/// ```
pub async fn info_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ImageInfoResponse>, ExtractError> {
    let source = state.context.resolver().resolve(&id).await?;
    let metadata = state.context.extractor().probe(&source).await?;
    Ok(Json(ImageInfoResponse {
        id,
        resolution_levels: available_levels(metadata.width, metadata.height),
        metadata,
    }))
}

/// `GET /images/{id}/xml`
///
/// XML box payloads in file order, as a JSON array of strings.
pub async fn xml_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ExtractError> {
    let source = state.context.resolver().resolve(&id).await?;
    let boxes = state.context.extractor().xml_boxes(&source).await?;
    Ok(Json(
        boxes
            .iter()
            .map(|payload| String::from_utf8_lossy(payload).into_owned())
            .collect(),
    ))
}

/// `GET /images/{id}/region`
///
/// # Query Parameters
///
/// - `region`: `top,left,height,width` (pixels, or fractions like `0.5`)
/// - `level` / `fit` / `reduce`: output resolution
/// - `rotate`: 0, 90, 180 or 270
/// - `layer`: compositing layer
/// - `quality`: JPEG quality 1-100
///
/// # Headers
///
/// - `Content-Type: image/jpeg`
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
///
/// A client that disconnects cancels the decode.
pub async fn region_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RegionQueryParams>,
) -> Result<Response, TileError> {
    let decode = query.decode_request().map_err(ExtractError::from)?;
    let quality = query.quality(state.context.default_quality())?;
    let source = state.context.resolver().resolve(&id).await?;

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let request = TileRequest::new(source, decode).with_quality(quality);
    let tile = state.context.tiles().get_tile(&request, &cancel).await?;

    let headers = [
        (header::CONTENT_TYPE, "image/jpeg".to_string()),
        (
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        ),
        (CACHE_HIT_HEADER, tile.cache_hit.to_string()),
    ];
    Ok((StatusCode::OK, headers, tile.data).into_response())
}

// =============================================================================
// Tests
// =============================================================================
