//! Confirmation Gateway Service
//!
//! REST API for issuing and confirming single-use action tokens

use anyhow::{Context, Result};
use confirmation_gateway::{create_router, AppState, ConfirmationGateway, Notifier, RedisTokenStore};
use std::env;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confirmation_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Configuration
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let host = env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("GATEWAY_PORT").unwrap_or_else(|_| "8086".to_string());
    let delivery_webhook = env::var("DELIVERY_WEBHOOK_URL").ok();

    info!("Starting Confirmation Gateway Service");
    info!("Redis URL: {}", redis_url);

    // Initialize storage
    let store = RedisTokenStore::new(&redis_url)
        .await
        .context("Failed to initialize token storage")?;

    // Create gateway, with delivery notification when configured
    let gateway = match delivery_webhook {
        Some(url) => {
            info!("Delivery webhook: {}", url);
            ConfirmationGateway::with_notifier(store, Notifier::new(url))
        }
        None => {
            info!("No delivery webhook configured; tokens are not forwarded");
            ConfirmationGateway::new(store)
        }
    };

    // Create application state
    let state = AppState { gateway };

    // Create router
    let app = create_router(state);

    // Bind and serve
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Confirmation Gateway Service running on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
