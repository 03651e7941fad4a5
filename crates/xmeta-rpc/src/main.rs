//! xmeta RPC Server - JSON-RPC backend for the metadata pipeline.
//!
//! Serves `get_expanded_metadata` / `refresh_expanded_metadata` over JSON-RPC
//! and the downloaded preview media over plain HTTP.

mod handlers;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use xmeta_core::{CatalogEndpoints, DirectoryModelRegistry, ExpandedMetadataApi, DEFAULT_SUBTYPE};

#[derive(Parser, Debug)]
#[command(name = "xmeta-rpc")]
#[command(about = "JSON-RPC server for expanded model metadata")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Cache root (defaults to the platform data directory)
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Model directory, as `<subtype>=<dir>` or just `<dir>` for Stable-Diffusion.
    /// May be repeated.
    #[arg(long = "models", value_parser = parse_model_root)]
    models: Vec<(String, PathBuf)>,

    /// Catalog API base URL
    #[arg(long)]
    catalog_api: Option<String>,

    /// Catalog website base URL, used for browse links
    #[arg(long)]
    catalog_web: Option<String>,

    /// Pause between media downloads, in milliseconds
    #[arg(long)]
    download_delay_ms: Option<u64>,
}

/// Parse a `--models` value.
fn parse_model_root(raw: &str) -> std::result::Result<(String, PathBuf), String> {
    let (subtype, dir) = match raw.split_once('=') {
        Some((subtype, dir)) => (subtype.trim(), dir.trim()),
        None => (DEFAULT_SUBTYPE, raw.trim()),
    };
    if subtype.is_empty() {
        return Err(format!("missing subtype in '{}'", raw));
    }
    if dir.is_empty() {
        return Err(format!("missing directory in '{}'", raw));
    }
    Ok((subtype.to_string(), PathBuf::from(dir)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting xmeta RPC Server");

    let data_root = match args.data_root {
        Some(path) => path,
        None => dirs::data_dir()
            .context("No platform data directory; pass --data-root")?
            .join("xmeta"),
    };
    info!("Data root: {}", data_root.display());

    let mut registry = DirectoryModelRegistry::new();
    for (subtype, dir) in args.models {
        info!("Model root for {}: {}", subtype, dir.display());
        registry = registry.with_subtype(subtype, dir);
    }

    let mut endpoints = CatalogEndpoints::default();
    if let Some(api_base) = args.catalog_api {
        endpoints.api_base = api_base;
    }
    if let Some(web_base) = args.catalog_web {
        endpoints.web_base = web_base;
    }

    let mut builder = ExpandedMetadataApi::builder(&data_root)
        .with_registry(Arc::new(registry))
        .catalog_endpoints(endpoints);
    if let Some(ms) = args.download_delay_ms {
        builder = builder.download_delay(Duration::from_millis(ms));
    }
    let api = builder.build()?;

    let addr = server::start_server(api, &args.host, args.port).await?;

    // Parent processes read the port from stdout
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
