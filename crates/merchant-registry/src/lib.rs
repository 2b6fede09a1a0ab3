//! Merchant/Program Registry Service
//!
//! Owns merchant and coupon-program records, issuance caps, and
//! verification-key bindings. The Coupon Ledger reserves issuance slots
//! through this crate's storage layer.

pub mod handlers;
pub mod memory;
pub mod models;
pub mod registry;
pub mod storage;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handlers::AppState;
pub use memory::MemoryRegistryStore;
pub use models::{Merchant, Program};
pub use registry::Registry;
pub use storage::{RedisRegistryStore, RegistryStore};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/api/merchants",
            post(handlers::register_merchant_handler).get(handlers::list_merchants_handler),
        )
        .route(
            "/api/merchants/:merchant_id",
            get(handlers::get_merchant_handler).put(handlers::update_merchant_handler),
        )
        .route(
            "/api/merchants/:merchant_id/deactivate",
            post(handlers::deactivate_merchant_handler),
        )
        .route(
            "/api/merchants/:merchant_id/programs",
            get(handlers::list_merchant_programs_handler),
        )
        .route("/api/programs", post(handlers::create_program_handler))
        .route("/api/programs/:program_id", get(handlers::get_program_handler))
        .route(
            "/api/programs/:program_id/verification-key",
            put(handlers::register_key_handler),
        )
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
