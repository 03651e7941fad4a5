//! Embedded metadata from the safetensors header.
//!
//! Layout:
//! - 0-7: header length N (i64, little-endian)
//! - 8..8+N: UTF-8 JSON object of tensor layout plus an optional
//!   `__metadata__` object of free-form string pairs
//!
//! Only `__metadata__` is surfaced. Corrupt or non-conforming files yield an
//! empty mapping instead of an error.

use crate::config::HashConfig;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Reserved header key holding free-form metadata.
const METADATA_KEY: &str = "__metadata__";

/// Read the 8-byte header length prefix.
///
/// Returns `Ok(None)` when the length is negative or above the sanity ceiling.
pub(crate) fn read_header_len<R: Read>(reader: &mut R) -> std::io::Result<Option<u64>> {
    let mut size_buf = [0u8; 8];
    reader.read_exact(&mut size_buf)?;
    let header_len = i64::from_le_bytes(size_buf);

    if !(0..=HashConfig::MAX_HEADER_BYTES).contains(&header_len) {
        return Ok(None);
    }
    Ok(Some(header_len as u64))
}

/// Read the embedded `__metadata__` mapping of a model file.
///
/// Values that are not JSON strings are kept as their JSON text.
pub fn read_embedded_metadata(path: impl AsRef<Path>) -> BTreeMap<String, String> {
    let path = path.as_ref();
    match try_read_embedded_metadata(path) {
        Ok(metadata) => metadata,
        Err(reason) => {
            warn!("Failed to read header metadata from {}: {}", path.display(), reason);
            BTreeMap::new()
        }
    }
}

fn try_read_embedded_metadata(path: &Path) -> Result<BTreeMap<String, String>, String> {
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;

    let Some(header_len) = read_header_len(&mut file).map_err(|e| e.to_string())? else {
        debug!("Header length out of bounds in {}", path.display());
        return Ok(BTreeMap::new());
    };

    let mut header_buf = Vec::new();
    file.take(header_len)
        .read_to_end(&mut header_buf)
        .map_err(|e| e.to_string())?;
    if header_buf.len() as u64 != header_len {
        return Err(format!(
            "truncated header: expected {} bytes, found {}",
            header_len,
            header_buf.len()
        ));
    }

    let header: Value = serde_json::from_slice(&header_buf).map_err(|e| e.to_string())?;

    let Some(Value::Object(metadata)) = header.get(METADATA_KEY) else {
        return Ok(BTreeMap::new());
    };

    Ok(metadata
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect())
}
