//! Region requests and geometry resolution.
//!
//! ```text
//! "{100,50},{200,300}" + level 2        ImageMetadata
//!            │                                │
//!            ▼                                │
//!   DecodeRequest (validated) ────────────────┤
//!                                             ▼
//!                                   resolve() ─► ResolvedParameters
//!                                                (reduce, [t,l,h,w], rotation, layer)
//! ```

mod geometry;
mod request;

pub use geometry::{
    available_levels, reduce_for_level, resolve, scaling_level, RegionBox, ResolvedParameters,
    MIN_LEVEL_DIMENSION,
};
pub use request::{Coordinate, DecodeRequest, Region, Rotation};
