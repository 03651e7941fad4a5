//! Metadata acquisition pipeline.
//!
//! A request resolves the model, locates its document by tensor hash, and
//! either returns the cached document or rebuilds it:
//!
//! 1. header metadata → save
//! 2. content hashes → save
//! 3. catalog lookup + media download → save
//!
//! Each save fully overwrites the document, so a failure mid-run leaves the
//! last completed stage on disk.

mod builder;
mod in_flight;

pub use builder::ExpandedMetadataApiBuilder;

use crate::assets::AssetFetcher;
use crate::catalog::CatalogLookup;
use crate::config::HashConfig;
use crate::error::{Result, XmetaError};
use crate::hashing::{compute_autov3_async, compute_content_hashes, normalize_hex, short_form};
use crate::header::read_embedded_metadata;
use crate::metadata::{MetadataDocument, MetadataStore};
use crate::registry::{resolve_model, ModelEntry, ModelRegistry};
use in_flight::InFlight;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Entry point for metadata acquisition.
pub struct ExpandedMetadataApi {
    registry: Arc<dyn ModelRegistry>,
    store: MetadataStore,
    catalog: Arc<dyn CatalogLookup>,
    fetcher: AssetFetcher,
    in_flight: InFlight,
}

impl std::fmt::Debug for ExpandedMetadataApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpandedMetadataApi")
            .field("store", &self.store)
            .finish()
    }
}

impl ExpandedMetadataApi {
    /// Create a builder rooted at `data_root`.
    pub fn builder(data_root: impl Into<PathBuf>) -> ExpandedMetadataApiBuilder {
        ExpandedMetadataApiBuilder::new(data_root)
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Directory served by the media endpoint.
    pub fn media_root(&self) -> &Path {
        self.store.images_dir()
    }

    /// Return the cached document for a model, building it on a miss.
    pub async fn get_expanded_metadata(
        &self,
        model_path: &str,
        subtype: &str,
    ) -> Result<MetadataDocument> {
        info!("Expanded metadata requested for {} ({})", model_path, subtype);
        let model = self.resolve_readable_model(model_path, subtype)?;
        let document_path = self.resolve_document_path(&model).await?;

        let _guard = self.in_flight.acquire(&document_path).await;

        let load_path = document_path.clone();
        match self.with_store(move |store| store.load(&load_path)).await {
            Ok(Some(document)) => {
                debug!("Metadata cache hit: {}", document_path.display());
                return Ok(document);
            }
            Ok(None) => debug!("Metadata cache miss: {}", document_path.display()),
            Err(e) => error!("Failed to read existing metadata file: {}", e),
        }

        Ok(self.create_document(&model, &document_path).await)
    }

    /// Discard any cached document for a model and rebuild it.
    pub async fn refresh_expanded_metadata(
        &self,
        model_path: &str,
        subtype: &str,
    ) -> Result<MetadataDocument> {
        info!("Expanded metadata refresh for {} ({})", model_path, subtype);
        let model = self.resolve_readable_model(model_path, subtype)?;
        // The file may have been replaced in place; rehash from scratch.
        self.registry.forget_tensor_hash(&model);
        let document_path = self.resolve_document_path(&model).await?;

        let _guard = self.in_flight.acquire(&document_path).await;

        let stale_path = document_path.clone();
        self.with_store(move |store| store.invalidate(&stale_path)).await?;
        Ok(self.create_document(&model, &document_path).await)
    }

    fn resolve_readable_model(&self, model_path: &str, subtype: &str) -> Result<ModelEntry> {
        let model = resolve_model(self.registry.as_ref(), subtype, model_path)?;

        std::fs::File::open(&model.file_path).map_err(|e| XmetaError::FileUnreadable {
            path: model.file_path.clone(),
            reason: e.to_string(),
        })?;

        Ok(model)
    }

    /// Tensor hash from the registry, computing and recording it if unknown.
    async fn tensor_hash(&self, model: &ModelEntry) -> Option<String> {
        if let Some(hash) = self
            .registry
            .known_tensor_hash(model)
            .filter(|h| !h.trim().is_empty())
        {
            return Some(normalize_hex(&hash));
        }

        info!("Tensor hash unknown for {}, calculating...", model.name);
        match compute_autov3_async(&model.file_path).await {
            Ok(hash) => {
                self.registry.record_tensor_hash(model, &hash);
                Some(hash)
            }
            Err(e) => {
                warn!("Could not compute tensor hash for {}: {}", model.name, e);
                None
            }
        }
    }

    async fn resolve_document_path(&self, model: &ModelEntry) -> Result<PathBuf> {
        let short = self
            .tensor_hash(model)
            .await
            .map(|hash| short_form(&hash, HashConfig::AUTOV3_SHORT_LEN));
        let display_name = model.display_name();
        self.with_store(move |store| store.resolve_path(short.as_deref(), &display_name)).await
    }

    /// Run a synchronous store operation on the blocking pool.
    async fn with_store<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&MetadataStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| XmetaError::Other(format!("Metadata store task failed: {}", e)))?
    }

    /// Persist the current state of `document` as a checkpoint.
    async fn save_checkpoint(&self, path: &Path, document: &MetadataDocument) -> Result<()> {
        let path = path.to_path_buf();
        let snapshot = document.clone();
        self.with_store(move |store| store.save(&path, &snapshot)).await
    }

    /// Run the pipeline, recording a failure on the returned document.
    async fn create_document(&self, model: &ModelEntry, path: &Path) -> MetadataDocument {
        let mut document = MetadataDocument::default();
        if let Err(e) = self.fill_document(model, path, &mut document).await {
            error!("Failed to create expanded metadata for {}: {}", model.name, e);
            document.error = Some(e.to_string());
        }
        document
    }

    async fn fill_document(
        &self,
        model: &ModelEntry,
        path: &Path,
        document: &mut MetadataDocument,
    ) -> Result<()> {
        document.file_name = model.file_name();
        document.file_path = model.file_path.to_string_lossy().into_owned();

        let file_path = model.file_path.clone();
        document.file_metadata =
            tokio::task::spawn_blocking(move || read_embedded_metadata(&file_path))
                .await
                .map_err(|e| XmetaError::Other(format!("Header read task failed: {}", e)))?;
        self.save_checkpoint(path, document).await?;
        debug!("Saved header checkpoint for {}", model.name);

        let hashes =
            compute_content_hashes(&model.file_path, self.registry.known_tensor_hash(model)).await?;
        if !hashes.sha256_autov3.is_empty() {
            self.registry.record_tensor_hash(model, &hashes.sha256_autov3);
        }
        document.hashes = Some(hashes.clone());
        self.save_checkpoint(path, document).await?;
        debug!("Saved hash checkpoint for {}", model.name);

        if !hashes.is_empty() {
            if let Some(mut section) = self
                .catalog
                .lookup(&hashes.autov2_short, &hashes.autov3_short)
                .await
            {
                let identifier = if hashes.autov3_short.is_empty() {
                    &hashes.autov2_short
                } else {
                    &hashes.autov3_short
                };
                if let Some(items) = section.media_items_mut() {
                    if !items.is_empty() {
                        let target = self.store.images_dir_for(identifier);
                        if let Err(e) =
                            self.fetcher.download_media(items, identifier, &target).await
                        {
                            error!("Failed to download catalog media: {}", e);
                        }
                    }
                }
                document.civitai = Some(section);
            } else {
                info!("No catalog data for {}", model.name);
            }
        }

        self.save_checkpoint(path, document).await?;
        info!("Saved expanded metadata: {}", path.display());
        Ok(())
    }
}
