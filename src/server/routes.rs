//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                     - Health check
//! /images/{id}/info           - Image metadata (JSON)
//! /images/{id}/xml            - XML boxes (JSON array)
//! /images/{id}/region         - Rendered region (JPEG)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use jp2_streamer::server::{create_router, RouterConfig};
//!
//! let router = create_router(context, RouterConfig::new().with_cache_max_age(600));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, info_handler, region_handler, xml_handler, AppState};
use crate::context::ImagingContext;

/// Default Cache-Control max-age (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Any origin, one hour max-age, tracing on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// An empty vec disallows all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
pub fn create_router(context: Arc<ImagingContext>, config: RouterConfig) -> Router {
    let state = AppState::with_cache_max_age(context, config.cache_max_age);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/images/{id}/info", get(info_handler))
        .route("/images/{id}/xml", get(xml_handler))
        .route("/images/{id}/region", get(region_handler))
        .with_state(state)
        .layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed)
        }
    }
}
