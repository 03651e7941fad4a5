//! xmeta core - enriched metadata for local safetensors models.
//!
//! Computes stable content hashes for model files, reads their embedded
//! header metadata, looks them up in an external catalog, downloads preview
//! media, and caches the result as one JSON document per model. It can be
//! used programmatically without any HTTP/RPC layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xmeta_core::{DirectoryModelRegistry, ExpandedMetadataApi};
//!
//! #[tokio::main]
//! async fn main() -> xmeta_core::Result<()> {
//!     let registry = DirectoryModelRegistry::new()
//!         .with_subtype("Stable-Diffusion", "/models/Stable-Diffusion");
//!     let api = ExpandedMetadataApi::builder("/srv/xmeta")
//!         .with_registry(Arc::new(registry))
//!         .build()?;
//!
//!     let doc = api
//!         .get_expanded_metadata("sdxl/base.safetensors", "Stable-Diffusion")
//!         .await?;
//!     println!("{}", doc.file_name);
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hashing;
pub mod header;
pub mod media;
pub mod metadata;
pub mod registry;

mod api;

pub use api::{ExpandedMetadataApi, ExpandedMetadataApiBuilder};
pub use assets::{AssetFetcher, DownloadSummary};
pub use catalog::{CatalogClient, CatalogEndpoints, CatalogLookup};
pub use config::DEFAULT_SUBTYPE;
pub use error::{Result, XmetaError};
pub use hashing::ContentHashes;
pub use media::{MediaError, MediaFile};
pub use metadata::{CatalogSection, MetadataDocument, MetadataStore};
pub use registry::{DirectoryModelRegistry, ModelEntry, ModelRegistry};
