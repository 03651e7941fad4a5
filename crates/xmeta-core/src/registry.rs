//! Model reference resolution.
//!
//! The pipeline needs two capabilities from whatever owns the model set:
//! resolve `(subtype, logical path)` to a file, and remember a model's tensor
//! hash so it is not recomputed on every request.

use crate::config::PathsConfig;
use crate::error::{Result, XmetaError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;
use tracing::debug;

/// A resolved local model file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    /// Normalized logical path, e.g. `sdxl/base.safetensors`.
    pub name: String,
    /// Subtype category the model was found in.
    pub subtype: String,
    /// Absolute path of the model file.
    pub file_path: PathBuf,
}

impl ModelEntry {
    /// File name including extension.
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name without extension, embedded in metadata file names.
    pub fn display_name(&self) -> String {
        self.file_path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Lookup collaborator owning the set of known models.
pub trait ModelRegistry: Send + Sync {
    /// Whether models of this subtype can be resolved at all.
    fn has_subtype(&self, subtype: &str) -> bool;

    /// Find a model by normalized logical path.
    fn get_model(&self, subtype: &str, model_path: &str) -> Option<ModelEntry>;

    /// Previously computed tensor hash for a model, if any.
    fn known_tensor_hash(&self, model: &ModelEntry) -> Option<String>;

    /// Remember a model's tensor hash.
    fn record_tensor_hash(&self, model: &ModelEntry, hash: &str);

    /// Drop a remembered tensor hash so the next request recomputes it.
    fn forget_tensor_hash(&self, _model: &ModelEntry) {}
}

/// Unify separators, collapse duplicates and strip the leading separator.
pub fn normalize_model_path(raw: &str) -> String {
    let mut path = raw.replace('\\', "/");
    while path.contains("//") {
        path = path.replace("//", "/");
    }
    path.trim_start_matches('/').to_string()
}

/// Resolve a caller-supplied model reference.
pub fn resolve_model(
    registry: &dyn ModelRegistry,
    subtype: &str,
    raw_model_path: &str,
) -> Result<ModelEntry> {
    if !registry.has_subtype(subtype) {
        return Err(XmetaError::UnknownSubtype(subtype.to_string()));
    }

    let model_path = normalize_model_path(raw_model_path);
    registry
        .get_model(subtype, &model_path)
        .ok_or_else(|| XmetaError::ModelNotFound {
            model_path,
            subtype: subtype.to_string(),
        })
}

/// Size and modification time of a model file when its hash was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Registry backed by one model directory per subtype.
///
/// Tensor hashes are cached in memory together with the file's size and
/// modification time; a replaced file no longer matches its cached hash.
#[derive(Debug, Default)]
pub struct DirectoryModelRegistry {
    roots: HashMap<String, PathBuf>,
    tensor_hashes: RwLock<HashMap<PathBuf, (FileStamp, String)>>,
}

impl DirectoryModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the model directory for a subtype.
    pub fn with_subtype(mut self, subtype: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(subtype.into(), root.into());
        self
    }

    pub fn subtypes(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    fn find_file(root: &Path, model_path: &str) -> Option<PathBuf> {
        if model_path.is_empty() || model_path.split('/').any(|s| s == "..") {
            return None;
        }

        let candidate = root.join(model_path);
        if candidate.is_file() {
            return Some(candidate);
        }

        if candidate.extension().is_none() {
            let with_ext = candidate.with_extension(PathsConfig::MODEL_EXTENSION);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }
        None
    }
}

impl ModelRegistry for DirectoryModelRegistry {
    fn has_subtype(&self, subtype: &str) -> bool {
        self.roots.contains_key(subtype)
    }

    fn get_model(&self, subtype: &str, model_path: &str) -> Option<ModelEntry> {
        let root = self.roots.get(subtype)?;
        let file_path = Self::find_file(root, model_path)?;
        let file_path = std::fs::canonicalize(&file_path).unwrap_or(file_path);
        debug!("Resolved {}:{} to {}", subtype, model_path, file_path.display());

        Some(ModelEntry {
            name: model_path.to_string(),
            subtype: subtype.to_string(),
            file_path,
        })
    }

    fn known_tensor_hash(&self, model: &ModelEntry) -> Option<String> {
        let current = FileStamp::of(&model.file_path)?;
        let hashes = self.tensor_hashes.read().ok()?;
        match hashes.get(&model.file_path) {
            Some((stamp, hash)) if *stamp == current => Some(hash.clone()),
            Some(_) => {
                debug!("Cached tensor hash is stale for {}", model.file_path.display());
                None
            }
            None => None,
        }
    }

    fn record_tensor_hash(&self, model: &ModelEntry, hash: &str) {
        let Some(stamp) = FileStamp::of(&model.file_path) else {
            return;
        };
        if let Ok(mut hashes) = self.tensor_hashes.write() {
            hashes.insert(model.file_path.clone(), (stamp, hash.to_string()));
        }
    }

    fn forget_tensor_hash(&self, model: &ModelEntry) {
        if let Ok(mut hashes) = self.tensor_hashes.write() {
            hashes.remove(&model.file_path);
        }
    }
}
