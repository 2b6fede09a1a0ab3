//! Merchant/Program Registry Service
//!
//! REST API for merchant registration, program creation, and
//! verification-key management

use anyhow::{Context, Result};
use merchant_registry::{create_router, AppState, RedisRegistryStore, Registry};
use std::env;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "merchant_registry=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Configuration
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let host = env::var("REGISTRY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("REGISTRY_PORT").unwrap_or_else(|_| "8083".to_string());

    info!("Starting Merchant Registry Service");
    info!("Redis URL: {}", redis_url);

    // Initialize storage
    let store = RedisRegistryStore::new(&redis_url)
        .await
        .context("Failed to initialize registry storage")?;

    // Create application state
    let state = AppState {
        registry: Registry::new(store),
    };

    // Create router
    let app = create_router(state);

    // Bind and serve
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Merchant Registry Service running on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
