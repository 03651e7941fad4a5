//! Hash-keyed metadata document store.
//!
//! Layout under the data root:
//! - `expanded_metadata/metadata/<short-hash>.meta.<model-name>.json`
//! - `expanded_metadata/images/<short-hash>/<n>.<ext>`
//!
//! A document is located by its short tensor hash, so an existing file is
//! reused even after the model's display name changes.

use crate::config::PathsConfig;
use crate::metadata::atomic::{atomic_read_json, atomic_write_json};
use crate::metadata::document::MetadataDocument;
use crate::{Result, XmetaError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Store for per-model metadata documents and their media directories.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    metadata_dir: PathBuf,
    images_dir: PathBuf,
}

impl MetadataStore {
    /// Create a store rooted at `data_root`.
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        let root = data_root.as_ref().join(PathsConfig::ROOT_DIR_NAME);
        Self {
            metadata_dir: root.join(PathsConfig::METADATA_DIR_NAME),
            images_dir: root.join(PathsConfig::IMAGES_DIR_NAME),
        }
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    /// Root directory served by the media endpoint.
    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Media directory for one content identifier.
    pub fn images_dir_for(&self, identifier: &str) -> PathBuf {
        self.images_dir.join(identifier)
    }

    /// Ensure both cache directories exist.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.metadata_dir, &self.images_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| XmetaError::Io {
                    message: format!("Failed to create directory {}", dir.display()),
                    path: Some(dir.clone()),
                    source: Some(e),
                })?;
                debug!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }

    /// Resolve the document path for a model.
    ///
    /// With a short hash, an existing `<short>.meta.*.json` wins; otherwise a
    /// new name embedding `display_name` is synthesized. Without one, the
    /// name falls back to the `unknown` token, which is not stable across
    /// renames.
    pub fn resolve_path(&self, short_hash: Option<&str>, display_name: &str) -> Result<PathBuf> {
        self.ensure_directories()?;

        let Some(short_hash) = short_hash.filter(|h| !h.is_empty()) else {
            warn!(
                "No content hash for {}, using name-based metadata file",
                display_name
            );
            return Ok(self.metadata_dir.join(document_file_name(
                PathsConfig::UNKNOWN_HASH_TOKEN,
                display_name,
            )));
        };

        if let Some(existing) = self.find_existing(short_hash)? {
            debug!("Found existing metadata file: {}", existing.display());
            return Ok(existing);
        }

        let path = self
            .metadata_dir
            .join(document_file_name(short_hash, display_name));
        info!("New metadata file for {}: {}", display_name, path.display());
        Ok(path)
    }

    /// Find a document whose name matches `<short>.meta.*.json`.
    fn find_existing(&self, short_hash: &str) -> Result<Option<PathBuf>> {
        let prefix = format!("{}.meta.", short_hash);
        let entries = std::fs::read_dir(&self.metadata_dir)
            .map_err(|e| XmetaError::io_with_path(e, &self.metadata_dir))?;

        let mut matches: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(&prefix) && name.ends_with(".json")
            })
            .map(|entry| entry.path())
            .collect();

        // Directory order is unspecified; keep the choice deterministic.
        matches.sort();
        Ok(matches.into_iter().next())
    }

    /// Load a document, `None` if it does not exist.
    pub fn load(&self, path: &Path) -> Result<Option<MetadataDocument>> {
        atomic_read_json(path)
    }

    /// Fully overwrite the document at `path`.
    pub fn save(&self, path: &Path, document: &MetadataDocument) -> Result<()> {
        atomic_write_json(path, document)
    }

    /// Delete the document at `path`. Returns whether a file was removed.
    pub fn invalidate(&self, path: &Path) -> Result<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!("Invalidated metadata file {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(XmetaError::io_with_path(e, path)),
        }
    }
}

fn document_file_name(hash_token: &str, display_name: &str) -> String {
    format!("{}.meta.{}.json", hash_token, display_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (MetadataStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path());
        (store, temp_dir)
    }

    #[test]
    fn test_layout() {
        let (store, temp_dir) = create_test_store();
        assert_eq!(
            store.metadata_dir(),
            temp_dir.path().join("expanded_metadata").join("metadata")
        );
        assert_eq!(
            store.images_dir_for("abcdef012345"),
            temp_dir
                .path()
                .join("expanded_metadata")
                .join("images")
                .join("abcdef012345")
        );
    }

    #[test]
    fn test_resolve_new_file_name() {
        let (store, _temp) = create_test_store();
        let path = store.resolve_path(Some("abcdef012345"), "my_model").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "abcdef012345.meta.my_model.json"
        );
        assert!(store.metadata_dir().exists());
    }

    #[test]
    fn test_resolve_is_stable_across_rename() {
        let (store, _temp) = create_test_store();
        let original = store.resolve_path(Some("abcdef012345"), "old_name").unwrap();
        store.save(&original, &MetadataDocument::default()).unwrap();

        let renamed = store.resolve_path(Some("abcdef012345"), "new_name").unwrap();
        assert_eq!(original, renamed);
    }

    #[test]
    fn test_resolve_ignores_other_hashes() {
        let (store, _temp) = create_test_store();
        let other = store.resolve_path(Some("111111111111"), "model").unwrap();
        store.save(&other, &MetadataDocument::default()).unwrap();

        let path = store.resolve_path(Some("222222222222"), "model").unwrap();
        assert_ne!(path, other);
    }

    #[test]
    fn test_resolve_without_hash_uses_unknown_token() {
        let (store, _temp) = create_test_store();
        let path = store.resolve_path(None, "model").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "unknown.meta.model.json"
        );
        let empty = store.resolve_path(Some(""), "model").unwrap();
        assert_eq!(path, empty);
    }

    #[test]
    fn test_save_load_invalidate() {
        let (store, _temp) = create_test_store();
        let path = store.resolve_path(Some("abcdef012345"), "model").unwrap();

        assert!(store.load(&path).unwrap().is_none());

        let doc = MetadataDocument {
            file_name: "model.safetensors".into(),
            ..Default::default()
        };
        store.save(&path, &doc).unwrap();
        assert_eq!(store.load(&path).unwrap(), Some(doc));

        assert!(store.invalidate(&path).unwrap());
        assert!(!store.invalidate(&path).unwrap());
        assert!(store.load(&path).unwrap().is_none());
    }
}
