//! Path checks and response metadata for serving downloaded media.
//!
//! A request path is rejected before touching the filesystem if it contains a
//! parent segment or an absolute-path marker. The composed path is then
//! canonicalized and must still lie under the media root.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Cache directive for media responses. Paths are content-addressed, so the
/// bytes behind any given path never change.
pub const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Rejection reasons when serving media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid path")]
    InvalidPath,

    #[error("Forbidden")]
    Forbidden,

    #[error("File not found")]
    NotFound,

    #[error("Internal server error")]
    Internal(#[source] std::io::Error),
}

impl MediaError {
    /// HTTP status code for the rejection.
    pub fn status_code(&self) -> u16 {
        match self {
            MediaError::InvalidPath => 400,
            MediaError::Forbidden => 403,
            MediaError::NotFound => 404,
            MediaError::Internal(_) => 500,
        }
    }
}

/// A media file ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub etag: String,
}

/// Normalize separators and reject traversal or absolute paths.
pub fn sanitize_relative_path(raw: &str) -> Result<String, MediaError> {
    let unified = raw.replace('\\', "/");

    if unified.is_empty() || unified.contains('\0') {
        return Err(MediaError::InvalidPath);
    }
    if unified.starts_with('/') || has_drive_prefix(&unified) || Path::new(&unified).is_absolute() {
        return Err(MediaError::InvalidPath);
    }

    let segments: Vec<&str> = unified
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    if segments.is_empty() || segments.iter().any(|s| *s == "..") {
        return Err(MediaError::InvalidPath);
    }

    Ok(segments.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Resolve a request path to an existing file under `root`.
pub fn resolve_media_path(root: &Path, raw: &str) -> Result<PathBuf, MediaError> {
    let relative = match sanitize_relative_path(raw) {
        Ok(relative) => relative,
        Err(e) => {
            warn!("Rejected invalid media path: {}", raw);
            return Err(e);
        }
    };

    let allowed = canonicalize(root)?;
    let resolved = canonicalize(&root.join(&relative))?;

    if !resolved.starts_with(&allowed) {
        warn!("Media path traversal attempt blocked: {}", raw);
        return Err(MediaError::Forbidden);
    }
    if !resolved.is_file() {
        return Err(MediaError::NotFound);
    }

    Ok(resolved)
}

fn canonicalize(path: &Path) -> Result<PathBuf, MediaError> {
    std::fs::canonicalize(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => MediaError::NotFound,
        _ => MediaError::Internal(e),
    })
}

/// Content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Entity tag derived from the file name.
pub fn etag_for(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("\"{}\"", name)
}

/// Resolve and read a media file.
pub async fn load_media(root: &Path, raw: &str) -> Result<MediaFile, MediaError> {
    let path = resolve_media_path(root, raw)?;
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => MediaError::NotFound,
        _ => MediaError::Internal(e),
    })?;

    Ok(MediaFile {
        bytes,
        content_type: content_type_for(&path),
        etag: etag_for(&path),
    })
}
