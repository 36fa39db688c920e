//! Configuration management for JP2 Streamer.
//!
//! Command-line arguments are parsed with clap; every option can also be set
//! through an environment variable with the `JP2_` prefix.
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use jp2_streamer::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Serve(config) = cli.command {
//!     println!("Listening on {}", config.bind_address());
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `JP2_ENGINE` - Decoding engine: native or process (default: native)
//! - `JP2_ENGINE_HOME` - Engine installation directory
//! - `JP2_ENGINE_EXE` - Expand executable (default: kdu_expand)
//! - `JP2_OUTPUT_MODE` - auto, pipe or temp-file (default: auto)
//! - `JP2_SETTLE_MS` - Delay before reading a temp-file result (default: 100)
//! - `JP2_HOST` - Server bind address (default: 0.0.0.0)
//! - `JP2_PORT` - Server port (default: 3000)
//! - `JP2_IMAGE_ROOT` - Directory images are served from (default: .)
//! - `JP2_CACHE_DIR` - Tile directory (default: <tmp>/jp2-streamer-tiles)
//! - `JP2_CACHE_TILES` - Max tiles to cache (default: 1000)
//! - `JP2_DELETE_WORKERS` - Concurrent evicted-tile deletions (default: 10)
//! - `JP2_JPEG_QUALITY` - Default JPEG quality (default: 80)
//! - `JP2_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::engine::{
    DecodeEngine, EngineKind, NativeEngine, OutputStrategy, ProcessConfig, ProcessEngine,
    DEFAULT_ENGINE_EXECUTABLE,
};
use crate::error::RegionError;
use crate::region::{DecodeRequest, Region, Rotation};
use crate::server::DEFAULT_CACHE_MAX_AGE;
use crate::tile::{DEFAULT_DELETE_WORKERS, DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default temp-file settle delay in milliseconds.
pub const DEFAULT_SETTLE_MS: u64 = 100;

/// Input path that reads the image from standard input.
pub const STDIN_INPUT: &str = "-";

// =============================================================================
// CLI Arguments
// =============================================================================

/// JP2 Streamer - JPEG 2000 region extraction and tile server.
#[derive(Parser, Debug, Clone)]
#[command(name = "jp2-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve image metadata and regions over HTTP.
    Serve(ServeConfig),

    /// Print image metadata as JSON.
    Probe(InspectConfig),

    /// Print the image's XML boxes.
    Xml(InspectConfig),

    /// Decode a region and write it as JPEG.
    Extract(ExtractConfig),
}

impl Command {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Command::Serve(config) => config.validate(),
            Command::Probe(config) | Command::Xml(config) => config.engine.validate(),
            Command::Extract(config) => config.validate(),
        }
    }
}

// =============================================================================
// Engine Arguments
// =============================================================================

/// Engine integration, as named on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineChoice {
    /// In-process OpenJPEG
    Native,
    /// External expand executable
    Process,
}

impl From<EngineChoice> for EngineKind {
    fn from(choice: EngineChoice) -> Self {
        match choice {
            EngineChoice::Native => EngineKind::Native,
            EngineChoice::Process => EngineKind::Process,
        }
    }
}

/// How the external engine hands back its output.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Pipe where supported, otherwise temp file
    Auto,
    /// Standard output pipe
    Pipe,
    /// Temporary file read after exit
    TempFile,
}

/// Options shared by every subcommand that decodes.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Decoding engine.
    #[arg(long, value_enum, default_value_t = EngineChoice::Native, env = "JP2_ENGINE")]
    pub engine: EngineChoice,

    /// Engine installation directory.
    ///
    /// Used as the working directory and library search path of the
    /// engine process, and to locate a relative executable.
    #[arg(long, env = "JP2_ENGINE_HOME")]
    pub engine_home: Option<PathBuf>,

    /// Expand executable.
    #[arg(long, default_value = DEFAULT_ENGINE_EXECUTABLE, env = "JP2_ENGINE_EXE")]
    pub engine_exe: PathBuf,

    /// Output delivery for the process engine.
    #[arg(long, value_enum, default_value_t = OutputMode::Auto, env = "JP2_OUTPUT_MODE")]
    pub output_mode: OutputMode,

    /// Milliseconds to wait before reading a temp-file result.
    #[arg(long, default_value_t = DEFAULT_SETTLE_MS, env = "JP2_SETTLE_MS")]
    pub settle_ms: u64,
}

impl Default for EngineArgs {
    fn default() -> Self {
        Self {
            engine: EngineChoice::Native,
            engine_home: None,
            engine_exe: PathBuf::from(DEFAULT_ENGINE_EXECUTABLE),
            output_mode: OutputMode::Auto,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

impl EngineArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.output_mode == OutputMode::Pipe && OutputStrategy::for_host() != OutputStrategy::Pipe
        {
            return Err("output_mode pipe is not supported on this platform".to_string());
        }
        if self.settle_ms > 60_000 {
            return Err("settle_ms must be at most 60000".to_string());
        }
        if let Some(home) = &self.engine_home {
            if !home.is_dir() {
                return Err(format!(
                    "engine_home {} is not a directory",
                    home.display()
                ));
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> EngineKind {
        self.engine.into()
    }

    /// Resolve the output mode once for this host.
    pub fn output_strategy(&self) -> OutputStrategy {
        match self.output_mode {
            OutputMode::Auto => OutputStrategy::for_host(),
            OutputMode::Pipe => OutputStrategy::Pipe,
            OutputMode::TempFile => OutputStrategy::TempFile,
        }
    }

    pub fn process_config(&self) -> ProcessConfig {
        let mut config = ProcessConfig::new(&self.engine_exe)
            .with_output(self.output_strategy())
            .with_settle(Duration::from_millis(self.settle_ms));
        if let Some(home) = &self.engine_home {
            config = config.with_home(home);
        }
        config
    }

    /// Construct the configured engine.
    pub fn build_engine(&self) -> Arc<dyn DecodeEngine> {
        match self.kind() {
            EngineKind::Native => Arc::new(NativeEngine::new()),
            EngineKind::Process => Arc::new(ProcessEngine::new(self.process_config())),
        }
    }
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "JP2_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "JP2_PORT")]
    pub port: u16,

    /// Directory image identifiers are resolved against.
    #[arg(long, default_value = ".", env = "JP2_IMAGE_ROOT")]
    pub image_root: PathBuf,

    /// Directory rendered tiles are written to.
    #[arg(long, env = "JP2_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum number of rendered tiles to keep.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "JP2_CACHE_TILES")]
    pub cache_tiles: usize,

    /// Concurrent deletions of evicted tiles.
    #[arg(long, default_value_t = DEFAULT_DELETE_WORKERS, env = "JP2_DELETE_WORKERS")]
    pub delete_workers: usize,

    /// Default JPEG quality for tile encoding (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "JP2_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "JP2_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated). Any origin if unset.
    #[arg(long, env = "JP2_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()?;

        if !self.image_root.is_dir() {
            return Err(format!(
                "image_root {} is not a directory",
                self.image_root.display()
            ));
        }
        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }
        if self.delete_workers == 0 {
            return Err("delete_workers must be greater than 0".to_string());
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Tile directory, defaulting to one under the system temp dir.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("jp2-streamer-tiles"))
    }
}

// =============================================================================
// Probe / Xml
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// JPEG 2000 file, or `-` for standard input.
    pub input: PathBuf,
}

// =============================================================================
// Extract
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ExtractConfig {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// JPEG 2000 file, or `-` for standard input.
    pub input: PathBuf,

    /// Output JPEG file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Region as top,left,height,width (pixels, or fractions like 0.25).
    #[arg(long)]
    pub region: Option<String>,

    /// Resolution level (0 = smallest).
    #[arg(long)]
    pub level: Option<u32>,

    /// Discard this many resolution levels.
    #[arg(long)]
    pub reduce: Option<u32>,

    /// Choose the level that fits WIDTH,HEIGHT.
    #[arg(long)]
    pub fit: Option<String>,

    /// Clockwise rotation: 0, 90, 180 or 270.
    #[arg(long, default_value_t = 0)]
    pub rotate: u32,

    /// Compositing layer.
    #[arg(long, default_value_t = 0)]
    pub layer: u32,

    /// JPEG quality (1-100).
    #[arg(short, long, default_value_t = DEFAULT_JPEG_QUALITY)]
    pub quality: u8,
}

impl ExtractConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()?;
        if self.quality == 0 || self.quality > 100 {
            return Err("quality must be between 1 and 100".to_string());
        }
        self.decode_request().map(|_| ()).map_err(|e| e.to_string())
    }

    /// Build the decode request from the region options.
    pub fn decode_request(&self) -> Result<DecodeRequest, RegionError> {
        let mut request = DecodeRequest::new()
            .with_rotation(Rotation::try_from(self.rotate)?)
            .with_layer(self.layer);

        if let Some(region) = &self.region {
            request = request.with_region(region.parse::<Region>()?);
        }
        if let Some(level) = self.level {
            request = request.with_level(level);
        }
        if let Some(reduce) = self.reduce {
            request = request.with_reduce(reduce);
        }
        if let Some(fit) = &self.fit {
            let invalid = || RegionError::InvalidParameter {
                name: "fit",
                value: fit.clone(),
            };
            let (w, h) = fit.split_once(',').ok_or_else(invalid)?;
            let w = w.trim().parse::<u32>().map_err(|_| invalid())?;
            let h = h.trim().parse::<u32>().map_err(|_| invalid())?;
            request = request.with_fit(w, h);
        }
        Ok(request)
    }
}

// =============================================================================
// Tests
// =============================================================================
