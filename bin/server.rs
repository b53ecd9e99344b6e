// Quote Sync - Mock remote server
// Serves GET/POST /api/quotes so `quote-sync --format quotes` has something to sync with

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use quote_sync::server::{router, AppState};
use quote_sync::{Config, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    quote_sync::init_tracing();

    info!("🌐 Quote Sync - Mock Remote Server");

    let config = Config::from_env()?;

    // The server keeps its own database so it never shares state with a client
    let store = SqliteStore::open(&config.server_db_path)?;
    info!("✓ Database opened: {}", config.server_db_path.display());

    let app = router(AppState::new(Arc::new(store)));

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;

    info!("🚀 Server running on http://{}", config.bind_address);
    info!("   API: http://{}/api/quotes", config.bind_address);

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
