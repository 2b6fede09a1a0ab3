//! Coupon Ledger Service
//!
//! The central orchestrator: owns coupon records, enforces the
//! issuance/redemption state machine, and coordinates the proof
//! verifier, merchant registry, confirmation gateway, and wallet
//! directory. Issuance caps and coupon redemption are atomic per entity;
//! cross-entity transitions use reservations with a reconciliation
//! sweep behind them.

pub mod handlers;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod reconcile;
pub mod storage;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handlers::{AppState, RedisLedger};
pub use ledger::CouponLedger;
pub use memory::MemoryCouponStore;
pub use models::{Coupon, CouponState, LedgerStats};
pub use reconcile::{Reconciler, SweepReport};
pub use storage::{CouponStore, RedisCouponStore};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/stats", get(handlers::stats_handler))
        .route("/api/coupons", post(handlers::issue_coupon_handler))
        .route("/api/coupons/:token_id", get(handlers::get_coupon_handler))
        .route(
            "/api/coupons/:token_id/valid",
            get(handlers::coupon_validity_handler),
        )
        .route(
            "/api/coupons/:token_id/redemption-token",
            post(handlers::initiate_redemption_handler),
        )
        .route(
            "/api/coupons/:token_id/redeem",
            post(handlers::redeem_coupon_handler),
        )
        .route(
            "/api/wallets/:address/coupons",
            get(handlers::wallet_coupons_handler),
        )
        .route(
            "/api/merchants/:merchant_id/coupons",
            get(handlers::merchant_coupons_handler),
        )
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
