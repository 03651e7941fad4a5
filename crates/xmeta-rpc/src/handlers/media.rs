//! Static media route for downloaded preview images and videos.

use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error, warn};
use xmeta_core::media::{load_media, CACHE_CONTROL};
use xmeta_core::MediaError;

/// Serve a file from the media root.
pub async fn handle_media(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    let file = match load_media(state.api.media_root(), &path).await {
        Ok(file) => file,
        Err(e) => return media_error_response(&path, e),
    };

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| etag_matches(v, &file.etag));

    if not_modified {
        debug!("Media not modified: {}", path);
        return (
            StatusCode::NOT_MODIFIED,
            [
                (header::ETAG, file.etag),
                (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
            ],
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CACHE_CONTROL, CACHE_CONTROL.to_string()),
            (header::ETAG, file.etag),
        ],
        file.bytes,
    )
        .into_response()
}

fn media_error_response(path: &str, err: MediaError) -> Response {
    match &err {
        MediaError::InvalidPath => warn!("Rejected media path: {}", path),
        MediaError::Forbidden => warn!("Blocked media path outside root: {}", path),
        MediaError::NotFound => debug!("Media not found: {}", path),
        MediaError::Internal(source) => error!("Failed to read media {}: {}", path, source),
    }

    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.to_string()).into_response()
}

/// Whether an `If-None-Match` header value covers `etag`.
fn etag_matches(header_value: &str, etag: &str) -> bool {
    header_value.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}
