//! Image sources accepted by the extractor.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use crate::error::ExtractError;

use super::signature::{check_signature, SIGNATURE_LEN};

/// A JPEG 2000 source: either a file on disk or an in-memory byte stream.
#[derive(Clone)]
pub enum ImageSource {
    /// Seekable file on the local filesystem
    File(PathBuf),

    /// Non-seekable stream, fully buffered, with a caller-supplied identity
    Bytes { id: String, data: Bytes },
}

impl ImageSource {
    /// Create a file-backed source.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ImageSource::File(path.into())
    }

    /// Create a stream-backed source.
    pub fn bytes(id: impl Into<String>, data: impl Into<Bytes>) -> Self {
        ImageSource::Bytes {
            id: id.into(),
            data: data.into(),
        }
    }

    /// Stable identity used in tile fingerprints and log lines.
    pub fn identity(&self) -> String {
        match self {
            ImageSource::File(path) => path.display().to_string(),
            ImageSource::Bytes { id, .. } => id.clone(),
        }
    }

    /// Whether the engine must read this source from a non-seekable stream.
    pub fn is_stream(&self) -> bool {
        matches!(self, ImageSource::Bytes { .. })
    }

    /// Path of a file-backed source.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ImageSource::File(path) => Some(path),
            ImageSource::Bytes { .. } => None,
        }
    }

    /// Read the leading signature bytes.
    ///
    /// A missing file maps to [`ExtractError::NotFound`]; a source shorter than
    /// the signature maps to [`ExtractError::InvalidFormat`].
    pub async fn read_signature(&self) -> Result<[u8; SIGNATURE_LEN], ExtractError> {
        let mut buf = [0u8; SIGNATURE_LEN];
        match self {
            ImageSource::File(path) => {
                let mut file = tokio::fs::File::open(path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ExtractError::NotFound(path.display().to_string())
                    } else {
                        ExtractError::from_io("open source", e)
                    }
                })?;
                file.read_exact(&mut buf).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        ExtractError::invalid_format("source is shorter than the JP2 signature")
                    } else {
                        ExtractError::from_io("read source signature", e)
                    }
                })?;
            }
            ImageSource::Bytes { data, .. } => {
                if data.len() < SIGNATURE_LEN {
                    return Err(ExtractError::invalid_format(
                        "source is shorter than the JP2 signature",
                    ));
                }
                buf.copy_from_slice(&data[..SIGNATURE_LEN]);
            }
        }
        Ok(buf)
    }

    /// Verify the JP2 signature without reading the rest of the source.
    pub async fn verify(&self) -> Result<(), ExtractError> {
        let signature = self.read_signature().await?;
        check_signature(&signature)
    }

    /// Load the whole source into memory.
    pub async fn read_all(&self) -> Result<Bytes, ExtractError> {
        match self {
            ImageSource::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ExtractError::NotFound(path.display().to_string())
                    } else {
                        ExtractError::from_io("read source", e)
                    }
                }),
            ImageSource::Bytes { data, .. } => Ok(data.clone()),
        }
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ImageSource::Bytes { id, data } => f
                .debug_struct("Bytes")
                .field("id", id)
                .field("len", &data.len())
                .finish(),
        }
    }
}
