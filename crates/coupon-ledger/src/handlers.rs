//! API request handlers for the Coupon Ledger

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use confirmation_gateway::{ConfirmationToken, RedisTokenStore};
use merchant_registry::RedisRegistryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use veilcoupon_common::{Commitment, Error, ErrorKind, ProofBundle, WalletAddress};
use wallet_directory::RedisWalletStore;

use crate::{
    ledger::CouponLedger,
    models::{Coupon, LedgerStats},
    storage::RedisCouponStore,
};

/// Default lifetime of redemption confirmation tokens
const DEFAULT_REDEMPTION_TTL_SECS: i64 = 900;

/// The Redis-backed ledger the service runs on
pub type RedisLedger =
    CouponLedger<RedisCouponStore, RedisRegistryStore, RedisTokenStore, RedisWalletStore>;

/// Shared application state
pub struct AppState {
    pub ledger: RedisLedger,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
            "kind": self.kind,
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match (&err, err.kind()) {
            (
                Error::CouponNotFound(_)
                | Error::ProgramNotFound(_)
                | Error::MerchantNotFound(_)
                | Error::TokenNotFound,
                _,
            ) => StatusCode::NOT_FOUND,
            (_, ErrorKind::Validation) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::Conflict) => StatusCode::CONFLICT,
            (_, ErrorKind::Expiry) => StatusCode::GONE,
            (_, ErrorKind::ProofRejected) => StatusCode::FORBIDDEN,
            (_, ErrorKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        ApiError {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Request to issue a coupon
#[derive(Debug, Deserialize)]
pub struct IssueCouponRequest {
    pub program_id: String,
    pub owner_wallet: String,
    pub metadata_commitment: String,
    /// Hex-encoded issuance proof bundle
    pub proof: String,
}

/// Request to redeem a coupon
#[derive(Debug, Deserialize)]
pub struct RedeemCouponRequest {
    /// Hex-encoded redemption proof bundle
    pub proof: String,
    pub confirmation_token: String,
}

/// Request to start a redemption confirmation round
#[derive(Debug, Deserialize, Default)]
pub struct InitiateRedemptionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<i64>,
}

/// Coupon info response
#[derive(Debug, Serialize)]
pub struct CouponResponse {
    pub coupon: Coupon,
}

/// Coupon list response
#[derive(Debug, Serialize)]
pub struct CouponsListResponse {
    pub coupons: Vec<Coupon>,
    pub total: usize,
}

/// Validity check response
#[derive(Debug, Serialize)]
pub struct ValidityResponse {
    pub token_id: String,
    pub valid: bool,
}

/// Redemption initiation response
#[derive(Debug, Serialize)]
pub struct InitiateRedemptionResponse {
    pub token: ConfirmationToken,
}

/// Stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: LedgerStats,
}

fn parse_wallet(hex: &str) -> Result<WalletAddress, ApiError> {
    WalletAddress::from_hex(hex).map_err(|_| ApiError::from(Error::InvalidCommitment))
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "coupon-ledger"
    }))
}

/// Issue a coupon against an eligibility proof
pub async fn issue_coupon_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IssueCouponRequest>,
) -> Result<Json<CouponResponse>, ApiError> {
    info!("Issuance request for program: {}", payload.program_id);

    let owner = parse_wallet(&payload.owner_wallet)?;
    let metadata = Commitment::from_hex(&payload.metadata_commitment)
        .map_err(|_| ApiError::from(Error::InvalidCommitment))?;
    let proof = ProofBundle::from_hex(&payload.proof)?;

    let coupon = state
        .ledger
        .issue(&payload.program_id, &owner, metadata, &proof)
        .await?;

    Ok(Json(CouponResponse { coupon }))
}

/// Get coupon details
pub async fn get_coupon_handler(
    State(state): State<Arc<AppState>>,
    Path(token_id): Path<String>,
) -> Result<Json<CouponResponse>, ApiError> {
    let coupon = state.ledger.get_coupon_details(&token_id).await?;
    Ok(Json(CouponResponse { coupon }))
}

/// Check coupon validity (pure read, lazy expiry)
pub async fn coupon_validity_handler(
    State(state): State<Arc<AppState>>,
    Path(token_id): Path<String>,
) -> Result<Json<ValidityResponse>, ApiError> {
    let valid = state.ledger.is_valid_coupon(&token_id).await?;
    Ok(Json(ValidityResponse { token_id, valid }))
}

/// Start a redemption confirmation round for a coupon
pub async fn initiate_redemption_handler(
    State(state): State<Arc<AppState>>,
    Path(token_id): Path<String>,
    payload: Option<Json<InitiateRedemptionRequest>>,
) -> Result<Json<InitiateRedemptionResponse>, ApiError> {
    let ttl_secs = payload
        .and_then(|Json(p)| p.ttl_secs)
        .unwrap_or(DEFAULT_REDEMPTION_TTL_SECS);

    let token = state
        .ledger
        .initiate_redemption(&token_id, Duration::seconds(ttl_secs))
        .await?;

    info!("Redemption initiated for coupon: {}", token_id);
    Ok(Json(InitiateRedemptionResponse { token }))
}

/// Redeem a coupon
pub async fn redeem_coupon_handler(
    State(state): State<Arc<AppState>>,
    Path(token_id): Path<String>,
    Json(payload): Json<RedeemCouponRequest>,
) -> Result<Json<CouponResponse>, ApiError> {
    let proof = ProofBundle::from_hex(&payload.proof)?;

    let coupon = state
        .ledger
        .redeem(&token_id, &proof, &payload.confirmation_token)
        .await?;

    Ok(Json(CouponResponse { coupon }))
}

/// List a wallet's coupons
pub async fn wallet_coupons_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<CouponsListResponse>, ApiError> {
    let wallet = parse_wallet(&address)?;
    let coupons = state.ledger.get_user_coupons(&wallet).await?;
    let total = coupons.len();
    Ok(Json(CouponsListResponse { coupons, total }))
}

/// List a merchant's coupons
pub async fn merchant_coupons_handler(
    State(state): State<Arc<AppState>>,
    Path(merchant_id): Path<String>,
) -> Result<Json<CouponsListResponse>, ApiError> {
    let coupons = state.ledger.get_merchant_coupons(&merchant_id).await?;
    let total = coupons.len();
    Ok(Json(CouponsListResponse { coupons, total }))
}

/// Ledger-wide counters
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.ledger.stats().await?;
    Ok(Json(StatsResponse { stats }))
}
