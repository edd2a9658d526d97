//! devtrack-server binary.

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use devtrack_server::cache::CacheClient;
use devtrack_server::store::Store;
use devtrack_server::{create_router, AppState, ServerConfig};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("devtrack_server=info,warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let config = ServerConfig::parse();
    info!("devtrack-server starting");

    let db_path = config.db_path()?;
    let store = Store::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let cache = CacheClient::from_config(&config.cache_backend()).await;
    let _probe = cache.spawn_health_probe(config.probe_interval());

    let app = create_router(AppState::new(store, cache));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!(addr = %config.bind, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
