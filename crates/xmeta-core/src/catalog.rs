//! Catalog lookup by content hash.
//!
//! Queries the upstream registry's by-hash endpoint with the whole-file short
//! hash first and the tensor short hash second, then enriches a match with
//! the full model record. Every failure is logged and reported as "no
//! catalog data"; nothing here aborts the pipeline.

use crate::config::{CatalogConfig, NetworkConfig};
use crate::error::{Result, XmetaError};
use crate::metadata::CatalogSection;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of catalog data for a model.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Look up a model by its short identifiers. Empty strings are skipped.
    async fn lookup(&self, autov2_short: &str, autov3_short: &str) -> Option<CatalogSection>;
}

/// Base URLs of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEndpoints {
    /// REST API root, e.g. `https://civitai.com/api/v1`.
    pub api_base: String,
    /// Website root used for browsable model links.
    pub web_base: String,
}

impl Default for CatalogEndpoints {
    fn default() -> Self {
        Self {
            api_base: CatalogConfig::API_BASE.to_string(),
            web_base: CatalogConfig::WEB_BASE.to_string(),
        }
    }
}

impl CatalogEndpoints {
    fn by_hash_url(&self, hash: &str) -> String {
        format!(
            "{}/model-versions/by-hash/{}",
            self.api_base.trim_end_matches('/'),
            path_segment(hash)
        )
    }

    fn model_url(&self, model_id: &str) -> String {
        format!(
            "{}/models/{}",
            self.api_base.trim_end_matches('/'),
            path_segment(model_id)
        )
    }

    fn browse_url(&self, model_id: &str, version_id: &str) -> String {
        format!(
            "{}/models/{}?modelVersionId={}",
            self.web_base.trim_end_matches('/'),
            model_id,
            version_id
        )
    }
}

/// Hashes and ids are hex/decimal; anything else is dropped from the path.
fn path_segment(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// HTTP client for the model catalog.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    endpoints: CatalogEndpoints,
}

impl CatalogClient {
    /// Create a client with the default timeout and user agent.
    pub fn new(endpoints: CatalogEndpoints) -> Result<Self> {
        Self::with_options(
            endpoints,
            NetworkConfig::REQUEST_TIMEOUT,
            NetworkConfig::USER_AGENT,
        )
    }

    /// Create a client with an explicit per-request timeout and user agent.
    pub fn with_options(
        endpoints: CatalogEndpoints,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| XmetaError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &CatalogEndpoints {
        &self.endpoints
    }

    /// GET a URL and parse the body as JSON, failing on non-2xx.
    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(XmetaError::CatalogStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|e| XmetaError::Json {
            message: format!("Failed to parse catalog response from {}: {}", url, e),
            source: None,
        })
    }

    /// Fetch the version record for one short hash.
    pub async fn fetch_version_by_hash(&self, hash: &str) -> Result<Value> {
        self.get_json(&self.endpoints.by_hash_url(hash)).await
    }

    /// Fetch the full model record (tags, creator, description).
    pub async fn fetch_model(&self, model_id: &str) -> Result<Value> {
        self.get_json(&self.endpoints.model_url(model_id)).await
    }

    /// Try each candidate hash in order and return the first match.
    async fn find_version(&self, candidates: &[&str]) -> Option<(Value, String)> {
        for hash in candidates {
            debug!("Catalog lookup by hash {}", hash);
            match self.fetch_version_by_hash(hash).await {
                Ok(data) => return Some((data, hash.to_string())),
                Err(e) => warn!("Catalog lookup failed for {}: {}", hash, e),
            }
        }
        None
    }
}

#[async_trait]
impl CatalogLookup for CatalogClient {
    async fn lookup(&self, autov2_short: &str, autov3_short: &str) -> Option<CatalogSection> {
        let candidates: Vec<&str> = [autov2_short, autov3_short]
            .into_iter()
            .filter(|h| !h.is_empty())
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let (mut data, hash_used) = self.find_version(&candidates).await?;

        let model_id = data.get("modelId").and_then(id_text);
        let version_id = data.get("id").and_then(id_text);

        if let Some(ref model_id) = model_id {
            match self.fetch_model(model_id).await {
                Ok(model) => {
                    if let Some(obj) = data.as_object_mut() {
                        obj.insert("model".to_string(), model);
                    }
                }
                Err(e) => warn!("Failed to fetch catalog model {}: {}", model_id, e),
            }
        }

        let model_url = self.endpoints.browse_url(
            model_id.as_deref().unwrap_or_default(),
            version_id.as_deref().unwrap_or_default(),
        );
        info!("Catalog match via {}: {}", hash_used, model_url);

        Some(CatalogSection {
            source: CatalogConfig::SOURCE.to_string(),
            data,
            hash_used,
            model_url,
        })
    }
}

/// Render a numeric or string id without JSON quoting.
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
