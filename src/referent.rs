//! Mapping image identifiers to sources.
//!
//! HTTP routes and the CLI address images by an identifier; a
//! [`ReferentResolver`] turns that into an [`ImageSource`]. The only
//! resolver shipped maps identifiers to files below a root directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::ExtractError;
use crate::format::ImageSource;

/// File extension tried when an identifier names no existing file.
pub const DEFAULT_EXTENSION: &str = "jp2";

/// Resolves image identifiers to sources.
#[async_trait]
pub trait ReferentResolver: Send + Sync {
    /// Resolve an identifier.
    ///
    /// Unknown identifiers yield [`ExtractError::NotFound`].
    async fn resolve(&self, id: &str) -> Result<ImageSource, ExtractError>;
}

/// Resolves identifiers to files under a root directory.
///
/// `scans/a` resolves to `<root>/scans/a` if it exists, else to
/// `<root>/scans/a.jp2`. Identifiers that are absolute or climb out of the
/// root are treated as unknown.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join an identifier onto the root, or `None` if it escapes.
    fn candidate(&self, id: &str) -> Option<PathBuf> {
        let relative = Path::new(id);
        let mut parts = relative.components().peekable();
        parts.peek()?;
        if !parts.all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl ReferentResolver for DirectoryResolver {
    async fn resolve(&self, id: &str) -> Result<ImageSource, ExtractError> {
        let not_found = || ExtractError::NotFound(id.to_string());
        let path = self.candidate(id).ok_or_else(not_found)?;

        if is_file(&path).await {
            return Ok(ImageSource::file(path));
        }

        let mut with_extension = path.into_os_string();
        with_extension.push(".");
        with_extension.push(DEFAULT_EXTENSION);
        let with_extension = PathBuf::from(with_extension);
        if is_file(&with_extension).await {
            return Ok(ImageSource::file(with_extension));
        }

        Err(not_found())
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
