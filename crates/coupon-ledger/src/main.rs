//! Coupon Ledger Service
//!
//! REST API for coupon issuance, redemption, and the read surface,
//! plus the background reconciliation sweep

use anyhow::{Context, Result};
use confirmation_gateway::{ConfirmationGateway, Notifier, RedisTokenStore};
use coupon_ledger::{create_router, AppState, CouponLedger, Reconciler, RedisCouponStore};
use merchant_registry::{RedisRegistryStore, Registry};
use std::env;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_directory::{RedisWalletStore, WalletDirectory};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coupon_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Configuration
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let host = env::var("LEDGER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("LEDGER_PORT").unwrap_or_else(|_| "8087".to_string());
    let sweep_interval_secs = env::var("SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);
    let delivery_webhook = env::var("DELIVERY_WEBHOOK_URL").ok();

    info!("Starting Coupon Ledger Service");
    info!("Redis URL: {}", redis_url);
    info!("Sweep interval: {}s", sweep_interval_secs);

    // Initialize storage for the ledger and its collaborators; all five
    // logical tables live in the same Redis.
    let coupon_store = RedisCouponStore::new(&redis_url)
        .await
        .context("Failed to initialize coupon storage")?;
    let registry_store = RedisRegistryStore::new(&redis_url)
        .await
        .context("Failed to initialize registry storage")?;
    let token_store = RedisTokenStore::new(&redis_url)
        .await
        .context("Failed to initialize token storage")?;
    let wallet_store = RedisWalletStore::new(&redis_url)
        .await
        .context("Failed to initialize wallet storage")?;

    let gateway = match delivery_webhook {
        Some(url) => {
            info!("Delivery webhook: {}", url);
            ConfirmationGateway::with_notifier(token_store, Notifier::new(url))
        }
        None => ConfirmationGateway::new(token_store),
    };

    let ledger = CouponLedger::new(
        coupon_store.clone(),
        Registry::new(registry_store.clone()),
        gateway,
        WalletDirectory::new(wallet_store),
    );

    // Spawn the reconciliation sweep
    let reconciler = Reconciler::new(coupon_store, Registry::new(registry_store));
    let sweep_handle = tokio::spawn(reconciler.start(sweep_interval_secs));

    // Create application state
    let state = AppState { ledger };

    // Create router
    let app = create_router(state);

    // Bind and serve
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Coupon Ledger Service running on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    sweep_handle.await?;

    Ok(())
}
