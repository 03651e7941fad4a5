//! Builder for configuring ExpandedMetadataApi initialization.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::api::in_flight::InFlight;
use crate::api::ExpandedMetadataApi;
use crate::assets::AssetFetcher;
use crate::catalog::{CatalogClient, CatalogEndpoints, CatalogLookup};
use crate::config::NetworkConfig;
use crate::error::Result;
use crate::metadata::MetadataStore;
use crate::registry::{DirectoryModelRegistry, ModelRegistry};

/// Builder for configuring ExpandedMetadataApi initialization.
///
/// # Example
///
/// ```rust,ignore
/// use xmeta_core::{DirectoryModelRegistry, ExpandedMetadataApi};
///
/// let registry = DirectoryModelRegistry::new()
///     .with_subtype("Stable-Diffusion", "/models/Stable-Diffusion");
/// let api = ExpandedMetadataApi::builder("/srv/xmeta")
///     .with_registry(Arc::new(registry))
///     .build()?;
/// ```
pub struct ExpandedMetadataApiBuilder {
    data_root: PathBuf,
    registry: Option<Arc<dyn ModelRegistry>>,
    catalog: Option<Arc<dyn CatalogLookup>>,
    endpoints: CatalogEndpoints,
    request_timeout: Duration,
    download_timeout: Duration,
    download_delay: Duration,
    user_agent: String,
}

impl ExpandedMetadataApiBuilder {
    /// Create a new builder. Cache directories live under
    /// `<data_root>/expanded_metadata/`.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            registry: None,
            catalog: None,
            endpoints: CatalogEndpoints::default(),
            request_timeout: NetworkConfig::REQUEST_TIMEOUT,
            download_timeout: NetworkConfig::DOWNLOAD_REQUEST_TIMEOUT,
            download_delay: NetworkConfig::DOWNLOAD_DELAY,
            user_agent: NetworkConfig::USER_AGENT.to_string(),
        }
    }

    /// Set the model registry. Default: an empty `DirectoryModelRegistry`.
    pub fn with_registry(mut self, registry: Arc<dyn ModelRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the HTTP catalog client entirely.
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogLookup>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the catalog base URLs used by the default client.
    pub fn catalog_endpoints(mut self, endpoints: CatalogEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Per-request timeout for catalog lookups.
    ///
    /// Default: 30 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Per-request timeout for media downloads.
    ///
    /// Default: 60 seconds
    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Pause between consecutive media downloads.
    ///
    /// Default: 500ms
    pub fn download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = delay;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Create the cache directories and HTTP clients.
    pub fn build(self) -> Result<ExpandedMetadataApi> {
        let store = MetadataStore::new(&self.data_root);
        store.ensure_directories()?;

        let catalog: Arc<dyn CatalogLookup> = match self.catalog {
            Some(catalog) => catalog,
            None => Arc::new(CatalogClient::with_options(
                self.endpoints,
                self.request_timeout,
                &self.user_agent,
            )?),
        };

        let fetcher = AssetFetcher::with_options(
            self.download_timeout,
            &self.user_agent,
            self.download_delay,
        )?;

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(DirectoryModelRegistry::new()));

        Ok(ExpandedMetadataApi {
            registry,
            store,
            catalog,
            fetcher,
            in_flight: InFlight::new(),
        })
    }
}
