//! HTTP server implementation using Axum.

use crate::handlers::{handle_health, handle_media, handle_rpc};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use xmeta_core::ExpandedMetadataApi;

/// Application state shared across handlers.
pub struct AppState {
    pub api: ExpandedMetadataApi,
}

/// Build the router for the given API.
pub fn router(api: ExpandedMetadataApi) -> Router {
    let state = Arc::new(AppState { api });

    Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .route("/media/*path", get(handle_media))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    api: ExpandedMetadataApi,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let app = router(api);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
