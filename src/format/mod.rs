//! Source handling and JPEG 2000 container inspection.
//!
//! - [`ImageSource`]: file or in-memory stream handed to an engine
//! - [`signature`]: the 12-byte JP2 signature check run before any engine call
//! - [`jp2`]: native box walker and codestream header reader
//! - [`ImageMetadata`]: what a probe reports about an image

pub mod jp2;
mod metadata;
pub mod signature;
mod source;

pub use metadata::ImageMetadata;
pub use signature::{check_signature, is_jp2_signature, JP2_SIGNATURE, SIGNATURE_LEN};
pub use source::ImageSource;
