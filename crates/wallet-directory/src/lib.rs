//! Wallet Directory Service
//!
//! Maps identity commitments (derived from email, one-way) to wallet
//! records and handles recovery. Addresses are deterministic in the
//! creating commitment and never reverse-derivable to the email.

pub mod directory;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod storage;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use directory::WalletDirectory;
pub use handlers::AppState;
pub use memory::MemoryWalletStore;
pub use models::Wallet;
pub use storage::{RedisWalletStore, WalletStore};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/wallets", post(handlers::create_wallet_handler))
        .route(
            "/api/wallets/by-commitment/:commitment",
            get(handlers::get_address_handler),
        )
        .route("/api/wallets/:address", get(handlers::get_wallet_handler))
        .route(
            "/api/wallets/:address/recover",
            post(handlers::recover_wallet_handler),
        )
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
