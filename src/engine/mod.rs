//! Decoding engines.
//!
//! The wavelet decode itself is delegated to an engine. Two integrations
//! exist behind one trait:
//!
//! ```text
//!                    ┌────────────────────────┐
//!                    │   DecodeEngine trait   │
//!                    │ probe / decode / xml   │
//!                    └───────────┬────────────┘
//!                ┌───────────────┴───────────────┐
//!                ▼                               ▼
//!   ┌─────────────────────────┐     ┌─────────────────────────┐
//!   │      ProcessEngine      │     │      NativeEngine       │
//!   │ expand executable, PNM  │     │ in-process OpenJPEG     │
//!   │ over pipes or temp file │     │ on the blocking pool    │
//!   └─────────────────────────┘     └─────────────────────────┘
//! ```
//!
//! The integration and the output strategy are chosen once, from
//! configuration, and never re-evaluated per call.

mod command;
mod expand;
mod native;
mod process;
mod record;

pub use command::{
    expand_command, format_region, library_path_var, probe_command, EngineCommand, EnginePath,
    STDIN_PATH, STDOUT_PATH,
};
#[cfg(all(test, unix))]
pub(crate) use expand::fake;
pub use expand::{ProcessConfig, ProcessEngine, DEFAULT_ENGINE_EXECUTABLE, DEFAULT_SETTLE};
pub use native::NativeEngine;
pub use process::{HandleState, Invocation, OutputTarget, ProcessAdapter};
pub use record::parse_record;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::ExtractError;
use crate::format::{jp2, ImageMetadata, ImageSource};
use crate::raster::Raster;
use crate::region::ResolvedParameters;

// =============================================================================
// DecodeEngine Trait
// =============================================================================

/// Capabilities every decoding engine provides.
#[async_trait]
pub trait DecodeEngine: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Read image properties without decoding pixels.
    ///
    /// Fails with `InvalidFormat` if the source is not JP2 and `NotFound`
    /// if it does not exist.
    async fn probe(&self, source: &ImageSource) -> Result<ImageMetadata, ExtractError>;

    /// Decode a region of the source.
    ///
    /// The returned raster is already rotated. Cancelling `cancel` tears the
    /// decode down and yields `ExtractError::Cancelled`.
    async fn decode(
        &self,
        source: &ImageSource,
        params: &ResolvedParameters,
        cancel: &CancellationToken,
    ) -> Result<Raster, ExtractError>;

    /// Payloads of the source's XML boxes, in file order.
    async fn list_xml_boxes(&self, source: &ImageSource) -> Result<Vec<Bytes>, ExtractError> {
        source.verify().await?;
        let data = source.read_all().await?;
        Ok(jp2::xml_boxes(&data)?)
    }
}

// =============================================================================
// Strategy Selection
// =============================================================================

/// Which engine integration to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineKind {
    /// In-process OpenJPEG binding
    #[default]
    Native,

    /// External expand executable
    Process,
}

/// How the out-of-process engine delivers its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStrategy {
    /// Engine writes to a pipe read concurrently with its run
    Pipe,

    /// Engine writes to a temporary file read after it exits
    TempFile,
}

impl OutputStrategy {
    /// Strategy supported by the host platform.
    ///
    /// Hosts without standard-stream pseudo-paths need temp files.
    pub fn for_host() -> Self {
        if cfg!(windows) {
            OutputStrategy::TempFile
        } else {
            OutputStrategy::Pipe
        }
    }
}
