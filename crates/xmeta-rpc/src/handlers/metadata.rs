//! Expanded metadata handlers.

use super::{get_str_param, require_str_param};
use crate::server::AppState;
use serde_json::{json, Value};
use tracing::warn;
use xmeta_core::{MetadataDocument, DEFAULT_SUBTYPE};

pub async fn get_expanded_metadata(
    state: &AppState,
    params: &Value,
) -> xmeta_core::Result<Value> {
    let model_path = require_str_param(params, "model_path", "modelPath")?;
    let subtype = get_str_param(params, "subtype", "subType").unwrap_or(DEFAULT_SUBTYPE);
    document_or_error(state.api.get_expanded_metadata(&model_path, subtype).await)
}

pub async fn refresh_expanded_metadata(
    state: &AppState,
    params: &Value,
) -> xmeta_core::Result<Value> {
    let model_path = require_str_param(params, "model_path", "modelPath")?;
    let subtype = get_str_param(params, "subtype", "subType").unwrap_or(DEFAULT_SUBTYPE);
    document_or_error(
        state
            .api
            .refresh_expanded_metadata(&model_path, subtype)
            .await,
    )
}

/// Resolution failures are reported in-band as `{"error": message}`.
fn document_or_error(result: xmeta_core::Result<MetadataDocument>) -> xmeta_core::Result<Value> {
    match result {
        Ok(document) => Ok(serde_json::to_value(document)?),
        Err(e) => {
            warn!("Expanded metadata unavailable: {}", e);
            Ok(json!({"error": e.to_string()}))
        }
    }
}
