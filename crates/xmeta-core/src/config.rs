//! Centralized configuration for xmeta.
//!
//! Defaults for hashing, network operations, the upstream catalog and the
//! on-disk cache layout.

use std::time::Duration;

/// Content hashing parameters.
pub struct HashConfig;

impl HashConfig {
    /// Chunk size for streaming reads (8MB, optimal for SSDs).
    pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;
    /// Hex prefix length of the whole-file (AutoV2) short form.
    pub const AUTOV2_SHORT_LEN: usize = 10;
    /// Hex prefix length of the tensor-region (AutoV3) short form.
    pub const AUTOV3_SHORT_LEN: usize = 12;
    /// Largest embedded header accepted before the file is treated as corrupt.
    pub const MAX_HEADER_BYTES: i64 = 100 * 1024 * 1024;
}

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
    /// Pause between consecutive media downloads.
    pub const DOWNLOAD_DELAY: Duration = Duration::from_millis(500);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const USER_AGENT: &'static str = "xmeta/0.1";
}

/// Upstream catalog endpoints.
pub struct CatalogConfig;

impl CatalogConfig {
    pub const API_BASE: &'static str = "https://civitai.com/api/v1";
    pub const WEB_BASE: &'static str = "https://civitai.com";
    pub const SOURCE: &'static str = "civitai";
}

/// Directory and file naming for the cache layout.
pub struct PathsConfig;

impl PathsConfig {
    pub const ROOT_DIR_NAME: &'static str = "expanded_metadata";
    pub const METADATA_DIR_NAME: &'static str = "metadata";
    pub const IMAGES_DIR_NAME: &'static str = "images";
    pub const UNKNOWN_HASH_TOKEN: &'static str = "unknown";
    pub const MODEL_EXTENSION: &'static str = "safetensors";
}

/// Subtype assumed when a caller does not name one.
pub const DEFAULT_SUBTYPE: &str = "Stable-Diffusion";
