//! Metadata document persistence.
//!
//! This module provides:
//! - Atomic JSON file operations
//! - The on-disk metadata document shape
//! - Hash-keyed document path resolution and invalidation

mod atomic;
mod document;
mod store;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use document::{CatalogSection, MetadataDocument, LOCAL_PATH_KEY, MEDIA_ITEMS_KEY};
pub use store::MetadataStore;
