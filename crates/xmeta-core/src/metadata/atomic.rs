//! Atomic file operations for safe JSON persistence.
//!
//! Writes go to a temp file with a PID+TID suffix, are synced to disk, and
//! are then renamed over the target. A crash mid-write leaves the previous
//! document intact.

use crate::{Result, XmetaError};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::process;
use std::thread;
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(XmetaError::Io {
                message: format!("Failed to open {}", path.display()),
                path: Some(path.to_path_buf()),
                source: Some(e),
            })
        }
    };

    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| XmetaError::Io {
            message: format!("Failed to read {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;

    let data: T = serde_json::from_str(&contents).map_err(|e| XmetaError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write data to a pretty-printed JSON file atomically.
///
/// The target is always fully replaced; nothing is merged with what was on
/// disk before.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| XmetaError::Io {
                message: format!("Failed to create directory {}", parent.display()),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }
    }

    let temp_path = path.with_extension(format!("json.{}.{}.tmp", process::id(), thread_id()));

    let serialized = serde_json::to_string_pretty(data).map_err(|e| XmetaError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| XmetaError::Io {
                message: format!("Failed to create temp file {}", temp_path.display()),
                path: Some(temp_path.clone()),
                source: Some(e),
            })?;

        file.write_all(serialized.as_bytes())
            .and_then(|_| file.flush())
            .and_then(|_| file.sync_all())
            .map_err(|e| XmetaError::Io {
                message: format!("Failed to write temp file {}", temp_path.display()),
                path: Some(temp_path.clone()),
                source: Some(e),
            })?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(XmetaError::Io {
            message: format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            ),
            path: Some(path.to_path_buf()),
            source: Some(e),
        });
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Get a unique thread identifier.
fn thread_id() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    format!("{:?}", thread::current().id()).hash(&mut hasher);
    hasher.finish()
}
