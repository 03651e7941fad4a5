//! The per-model metadata document.

use crate::hashing::ContentHashes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key of the media list inside a catalog record.
pub const MEDIA_ITEMS_KEY: &str = "images";

/// Key added to a media item once it has been downloaded.
pub const LOCAL_PATH_KEY: &str = "local_path";

/// Enriched metadata for one model file, persisted as pretty JSON.
///
/// Filled progressively: file info and header metadata first, then hashes,
/// then the optional catalog section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub file_metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<ContentHashes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub civitai: Option<CatalogSection>,
    /// Set when a stage failed after the document was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Catalog data for a matched model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSection {
    /// Catalog the data came from.
    pub source: String,
    /// Version record, with the full model record merged under `model`.
    pub data: Value,
    /// Short identifier that produced the match.
    pub hash_used: String,
    /// Browsable page for the matched version.
    pub model_url: String,
}

impl CatalogSection {
    /// Media items of the version record, if any.
    pub fn media_items(&self) -> &[Value] {
        self.data
            .get(MEDIA_ITEMS_KEY)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Mutable access to the media items, for recording local paths.
    pub fn media_items_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.data
            .get_mut(MEDIA_ITEMS_KEY)
            .and_then(Value::as_array_mut)
    }
}
