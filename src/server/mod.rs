//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │              GET /images/{id}/{info|xml|region}                 │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (requests, error → JSON) │  │ (router, CORS, tracing)     │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────┬───────────────────────────────┘
//!                                   ▼
//!                            ImagingContext
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, info_handler, region_handler, xml_handler, AppState, ErrorResponse,
    HealthResponse, ImageInfoResponse, RegionQueryParams, CACHE_HIT_HEADER,
};
pub use routes::{create_router, RouterConfig, DEFAULT_CACHE_MAX_AGE};
