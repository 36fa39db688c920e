use thiserror::Error;

/// Input validation errors for a region request.
///
/// These are raised while the request is parsed, before any engine work.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    /// A region token could not be parsed as a number
    #[error("Malformed region token '{token}' in '{region}'")]
    MalformedToken { region: String, token: String },

    /// Region did not contain exactly four coordinates
    #[error("Region '{region}' must have 4 values (top,left,height,width), got {count}")]
    WrongTokenCount { region: String, count: usize },

    /// Fractional coordinate outside 0..=1
    #[error("Fractional region value {value} in '{region}' is outside 0..=1")]
    FractionOutOfRange { region: String, value: f64 },

    /// Rotation is not a quarter turn
    #[error("Unsupported rotation: {0} (expected 0, 90, 180 or 270)")]
    UnsupportedRotation(u32),

    /// Level, reduce or layer parameter could not be parsed
    #[error("Invalid value for {name}: '{value}'")]
    InvalidParameter { name: &'static str, value: String },
}

/// Errors that can occur when walking JP2 boxes or the codestream main header
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Jp2Error {
    /// Data ended before a structure was complete
    #[error("Truncated data at offset {offset}: need {needed} bytes, have {available}")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Box length field is smaller than its own header
    #[error("Invalid box length {length} at offset {offset}")]
    InvalidBoxLength { offset: usize, length: u64 },

    /// No contiguous codestream box present
    #[error("No contiguous codestream (jp2c) box found")]
    MissingCodestream,

    /// Codestream does not start with SOC
    #[error("Codestream does not start with SOC marker (got 0x{0:04X})")]
    MissingSoc(u16),

    /// Required main-header marker segment not found
    #[error("Missing required marker segment: {0}")]
    MissingMarker(&'static str),
}

/// Errors produced while probing or decoding a JPEG 2000 source.
///
/// Everything that crosses the decoder boundary is translated into one of
/// these variants; raw `std::io::Error`s never escape.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// Source does not start with the JP2 signature box
    #[error("Invalid format: {reason}")]
    InvalidFormat { reason: String },

    /// Source file or identifier does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Region/level/rotation values were malformed
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] RegionError),

    /// Engine exited abnormally or reported a decode failure
    #[error("Decode failed (exit code {exit_code:?}): {stderr}")]
    DecodeProcess {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Stream or transport failure while talking to the engine
    #[error("I/O error during {context}: {message}")]
    Io {
        context: &'static str,
        message: String,
    },

    /// Engine output could not be interpreted as a raster image
    #[error("Invalid raster output: {0}")]
    InvalidRaster(String),

    /// Caller aborted the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Engine executable or environment is missing
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ExtractError {
    /// Translate an I/O error raised during `context`.
    ///
    /// `NotFound` is preserved so a missing source is reported as such.
    pub fn from_io(context: &'static str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ExtractError::NotFound(format!("{}: {}", context, err)),
            _ => ExtractError::Io {
                context,
                message: err.to_string(),
            },
        }
    }

    pub fn invalid_format(reason: impl Into<String>) -> Self {
        ExtractError::InvalidFormat {
            reason: reason.into(),
        }
    }
}

impl From<Jp2Error> for ExtractError {
    fn from(err: Jp2Error) -> Self {
        ExtractError::InvalidFormat {
            reason: err.to_string(),
        }
    }
}

/// Errors from the tile service layer.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Extraction failed
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// JPEG quality outside 1..=100
    #[error("Invalid quality: {quality} (must be 1-100)")]
    InvalidQuality { quality: u8 },

    /// Raster could not be encoded
    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },

    /// Tile file could not be written or read
    #[error("Tile storage error: {message}")]
    Storage { message: String },
}
