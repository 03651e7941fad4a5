//! Streaming content identifiers for model files.
//!
//! Two independent SHA256 digests exist per model:
//! - AutoV2: the whole file, byte for byte
//! - AutoV3: only the tensor payload that follows the embedded JSON header
//!
//! Each digest has a short form that is a fixed-length hex prefix. Short forms
//! are embedded in on-disk filenames, so their lengths never change.

use crate::config::HashConfig;
use crate::error::{Result, XmetaError};
use crate::header::read_header_len;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Both content identifiers of a model, full and short.
///
/// A digest that could not be computed is stored as an empty string, never
/// omitted, so consumers always see all four keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashes {
    #[serde(default)]
    pub sha256_autov2: String,
    #[serde(default)]
    pub autov2_short: String,
    #[serde(default)]
    pub sha256_autov3: String,
    #[serde(default)]
    pub autov3_short: String,
}

impl ContentHashes {
    /// Build the identifier set from whichever digests were obtained.
    pub fn from_digests(autov2: Option<String>, autov3: Option<String>) -> Self {
        let autov2 = autov2.map(|h| normalize_hex(&h)).unwrap_or_default();
        let autov3 = autov3.map(|h| normalize_hex(&h)).unwrap_or_default();
        Self {
            autov2_short: short_form(&autov2, HashConfig::AUTOV2_SHORT_LEN),
            autov3_short: short_form(&autov3, HashConfig::AUTOV3_SHORT_LEN),
            sha256_autov2: autov2,
            sha256_autov3: autov3,
        }
    }

    /// Whether neither digest could be computed.
    pub fn is_empty(&self) -> bool {
        self.sha256_autov2.is_empty() && self.sha256_autov3.is_empty()
    }
}

/// Take the first `len` characters of a hex digest.
pub fn short_form(full: &str, len: usize) -> String {
    full.chars().take(len).collect()
}

/// Strip a `0x` prefix and lowercase a hex digest.
///
/// Registries that cache tensor digests may store them as `0x{hex}`.
pub fn normalize_hex(hash: &str) -> String {
    let trimmed = hash.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}

/// Stream a reader through SHA256 and return the lowercase hex digest.
fn sha256_reader<R: Read>(reader: &mut R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HashConfig::CHUNK_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute the whole-file (AutoV2) digest.
pub fn compute_autov2(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| XmetaError::io_with_path(e, path))?;
    sha256_reader(&mut file).map_err(|e| XmetaError::io_with_path(e, path))
}

/// Compute the tensor-region (AutoV3) digest.
///
/// Hashes everything after the 8-byte length prefix and the JSON header. Fails
/// when the header length is out of bounds or the file ends inside the
/// header, since the tensor region cannot be located.
pub fn compute_autov3(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| XmetaError::io_with_path(e, path))?;

    let header_len = read_header_len(&mut file)
        .map_err(|e| XmetaError::io_with_path(e, path))?
        .ok_or_else(|| XmetaError::Other(format!("Invalid header length in {}", path.display())))?;

    let skipped = std::io::copy(&mut (&mut file).take(header_len), &mut std::io::sink())
        .map_err(|e| XmetaError::io_with_path(e, path))?;
    if skipped != header_len {
        return Err(XmetaError::Other(format!(
            "Truncated header in {}: expected {} bytes, found {}",
            path.display(),
            header_len,
            skipped
        )));
    }

    sha256_reader(&mut file).map_err(|e| XmetaError::io_with_path(e, path))
}

/// Compute the tensor digest on the blocking pool.
pub async fn compute_autov3_async(path: impl Into<PathBuf>) -> Result<String> {
    let path = path.into();
    tokio::task::spawn_blocking(move || compute_autov3(&path))
        .await
        .map_err(|e| XmetaError::Other(format!("Hash computation task failed: {}", e)))?
}

/// Compute both identifiers for a model file.
///
/// `known_autov3` is reused instead of rehashing the tensor region. Fails only
/// when the file cannot be opened; a single failing digest is logged and left
/// empty.
pub async fn compute_content_hashes(
    path: impl Into<PathBuf>,
    known_autov3: Option<String>,
) -> Result<ContentHashes> {
    let path = path.into();

    tokio::task::spawn_blocking(move || {
        std::fs::File::open(&path).map_err(|e| XmetaError::io_with_path(e, &path))?;

        let autov3 = match known_autov3.filter(|h| !h.trim().is_empty()) {
            Some(hash) => {
                debug!("Reusing known tensor hash for {}", path.display());
                Some(hash)
            }
            None => match compute_autov3(&path) {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!("Failed to compute tensor hash for {}: {}", path.display(), e);
                    None
                }
            },
        };

        let autov2 = match compute_autov2(&path) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Failed to compute file hash for {}: {}", path.display(), e);
                None
            }
        };

        Ok(ContentHashes::from_digests(autov2, autov3))
    })
    .await
    .map_err(|e| XmetaError::Other(format!("Hash computation task failed: {}", e)))?
}
