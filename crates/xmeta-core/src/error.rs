//! Error types for the metadata pipeline.
//!
//! Errors fall into three groups: input errors reported straight back to the
//! caller, I/O errors that abort a single request, and upstream errors that
//! the pipeline downgrades to missing catalog data.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the xmeta library.
#[derive(Debug, Error)]
pub enum XmetaError {
    // Input errors
    #[error("Invalid sub-type: {0}")]
    UnknownSubtype(String),

    #[error("Model not found: {model_path} in {subtype}")]
    ModelNotFound { model_path: String, subtype: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Model file unreadable: {path}: {reason}")]
    FileUnreadable { path: PathBuf, reason: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Upstream errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Catalog returned {status} for {url}")]
    CatalogStatus { url: String, status: u16 },

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for xmeta operations.
pub type Result<T> = std::result::Result<T, XmetaError>;

impl From<std::io::Error> for XmetaError {
    fn from(err: std::io::Error) -> Self {
        XmetaError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for XmetaError {
    fn from(err: serde_json::Error) -> Self {
        XmetaError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for XmetaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            XmetaError::Timeout(err.to_string())
        } else {
            XmetaError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl XmetaError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        XmetaError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether the error was caused by the caller's input rather than the
    /// environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            XmetaError::UnknownSubtype(_)
                | XmetaError::ModelNotFound { .. }
                | XmetaError::InvalidPath(_)
                | XmetaError::InvalidParams { .. }
        )
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// - -32602: Invalid params
    /// - -32603: Internal error
    /// - -32000: Network/connectivity error
    /// - -32002: Model not found
    /// - -32005: Validation error
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            XmetaError::InvalidParams { .. } => -32602,

            XmetaError::Network { .. }
            | XmetaError::Timeout(_)
            | XmetaError::CatalogStatus { .. }
            | XmetaError::DownloadFailed { .. } => -32000,

            XmetaError::ModelNotFound { .. } => -32002,

            XmetaError::UnknownSubtype(_) | XmetaError::InvalidPath(_) => -32005,

            _ => -32603,
        }
    }
}
