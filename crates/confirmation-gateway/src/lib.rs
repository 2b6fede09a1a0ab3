//! Confirmation Gateway Service
//!
//! Issues and consumes single-use, time-limited confirmation tokens that
//! bind a pending action to a wallet and payload. Consumption is an
//! atomic check-and-set - the primary defense against double-redemption
//! via simultaneous confirmation clicks.

pub mod gateway;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod notify;
pub mod storage;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use gateway::{ConfirmationGateway, ConfirmedAction};
pub use handlers::AppState;
pub use memory::MemoryTokenStore;
pub use models::{ConfirmationAction, ConfirmationToken, TokenIssuedEvent, TokenState};
pub use notify::Notifier;
pub use storage::{RedisTokenStore, TokenStore};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/tokens", post(handlers::issue_token_handler))
        .route(
            "/api/tokens/:token/confirm",
            post(handlers::confirm_token_handler),
        )
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
