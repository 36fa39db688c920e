//! JP2 signature detection.
//!
//! Every JP2-family file (JP2, JPX, JPM) starts with the same 12-byte
//! signature box. Anything else is rejected before an engine is ever invoked.

use crate::error::ExtractError;

/// Length of the signature box.
pub const SIGNATURE_LEN: usize = 12;

/// The JP2 signature box: length 12, type `jP  `, content `<CR><LF><0x87><LF>`.
pub const JP2_SIGNATURE: [u8; SIGNATURE_LEN] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

/// Check whether `bytes` begins with the JP2 signature.
pub fn is_jp2_signature(bytes: &[u8]) -> bool {
    bytes.len() >= SIGNATURE_LEN && bytes[..SIGNATURE_LEN] == JP2_SIGNATURE
}

/// Like [`is_jp2_signature`] but returns an `InvalidFormat` error on mismatch.
pub fn check_signature(bytes: &[u8]) -> Result<(), ExtractError> {
    if is_jp2_signature(bytes) {
        Ok(())
    } else {
        let shown = &bytes[..bytes.len().min(SIGNATURE_LEN)];
        Err(ExtractError::invalid_format(format!(
            "not a JP2 image (leading bytes {})",
            hex::encode(shown)
        )))
    }
}
