//! Wallet Directory Service
//!
//! REST API for wallet creation, identity-commitment lookups, and recovery

use anyhow::{Context, Result};
use std::env;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_directory::{create_router, AppState, RedisWalletStore, WalletDirectory};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallet_directory=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Configuration
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let host = env::var("DIRECTORY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("DIRECTORY_PORT").unwrap_or_else(|_| "8084".to_string());

    info!("Starting Wallet Directory Service");
    info!("Redis URL: {}", redis_url);

    // Initialize storage
    let store = RedisWalletStore::new(&redis_url)
        .await
        .context("Failed to initialize wallet storage")?;

    // Create application state
    let state = AppState {
        directory: WalletDirectory::new(store),
    };

    // Create router
    let app = create_router(state);

    // Bind and serve
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Wallet Directory Service running on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
