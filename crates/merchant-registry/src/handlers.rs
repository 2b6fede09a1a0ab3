//! API request handlers for the Merchant/Program Registry

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use veilcoupon_common::{Error, ErrorKind, WalletAddress};

use crate::{
    models::{Merchant, Program},
    registry::Registry,
    storage::RedisRegistryStore,
};

/// Shared application state
pub struct AppState {
    pub registry: Registry<RedisRegistryStore>,
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
            (Error::MerchantNotFound(_) | Error::ProgramNotFound(_), _) => StatusCode::NOT_FOUND,
            (Error::NotProgramOwner, _) => StatusCode::FORBIDDEN,
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

fn parse_wallet(hex: &str) -> Result<WalletAddress, ApiError> {
    WalletAddress::from_hex(hex).map_err(|_| ApiError::from(Error::InvalidCommitment))
}

/// Request to register a new merchant
#[derive(Debug, Deserialize)]
pub struct RegisterMerchantRequest {
    pub wallet_address: String,
}

/// Request to update merchant details
#[derive(Debug, Deserialize)]
pub struct UpdateMerchantRequest {
    pub wallet_address: String,
}

/// Merchant info response
#[derive(Debug, Serialize)]
pub struct MerchantResponse {
    pub merchant: Merchant,
}

/// Request to create a program
#[derive(Debug, Deserialize)]
pub struct CreateProgramRequest {
    pub merchant_id: String,
    pub validity_secs: i64,
    pub max_issuance: u64,
    pub verification_key: String,
}

/// Program info response
#[derive(Debug, Serialize)]
pub struct ProgramResponse {
    pub program: Program,
}

/// Request to rotate a program's verification key
#[derive(Debug, Deserialize)]
pub struct RegisterKeyRequest {
    /// Caller context: must be the owning merchant
    pub merchant_id: String,
    pub verification_key: String,
}

/// Response from key rotation
#[derive(Debug, Serialize)]
pub struct RegisterKeyResponse {
    pub program_id: String,
    pub key_version: u32,
}

/// Listing response
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub ids: Vec<String>,
    pub total: usize,
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "merchant-registry"
    }))
}

/// Register a new merchant
pub async fn register_merchant_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterMerchantRequest>,
) -> Result<Json<MerchantResponse>, ApiError> {
    let wallet = parse_wallet(&payload.wallet_address)?;
    let merchant = state.registry.register_merchant(wallet).await?;

    info!("Registered merchant: {}", merchant.merchant_id);
    Ok(Json(MerchantResponse { merchant }))
}

/// Get a merchant by id
pub async fn get_merchant_handler(
    State(state): State<Arc<AppState>>,
    Path(merchant_id): Path<String>,
) -> Result<Json<MerchantResponse>, ApiError> {
    let merchant = state.registry.require_merchant(&merchant_id).await?;
    Ok(Json(MerchantResponse { merchant }))
}

/// Update a merchant's details
pub async fn update_merchant_handler(
    State(state): State<Arc<AppState>>,
    Path(merchant_id): Path<String>,
    Json(payload): Json<UpdateMerchantRequest>,
) -> Result<Json<MerchantResponse>, ApiError> {
    let wallet = parse_wallet(&payload.wallet_address)?;
    let merchant = state
        .registry
        .update_merchant_details(&merchant_id, wallet)
        .await?;
    Ok(Json(MerchantResponse { merchant }))
}

/// Deactivate a merchant (merchants are never deleted)
pub async fn deactivate_merchant_handler(
    State(state): State<Arc<AppState>>,
    Path(merchant_id): Path<String>,
) -> Result<Json<MerchantResponse>, ApiError> {
    let merchant = state.registry.deactivate_merchant(&merchant_id).await?;
    Ok(Json(MerchantResponse { merchant }))
}

/// List all merchant ids
pub async fn list_merchants_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListResponse>, ApiError> {
    let ids = state.registry.list_merchants().await?;
    let total = ids.len();
    Ok(Json(ListResponse { ids, total }))
}

/// Create a new coupon program
pub async fn create_program_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProgramRequest>,
) -> Result<Json<ProgramResponse>, ApiError> {
    info!("Creating program for merchant: {}", payload.merchant_id);

    let program = state
        .registry
        .create_program(
            &payload.merchant_id,
            payload.validity_secs,
            payload.max_issuance,
            &payload.verification_key,
        )
        .await?;

    Ok(Json(ProgramResponse { program }))
}

/// Get a program by id
pub async fn get_program_handler(
    State(state): State<Arc<AppState>>,
    Path(program_id): Path<String>,
) -> Result<Json<ProgramResponse>, ApiError> {
    let program = state.registry.require_program(&program_id).await?;
    Ok(Json(ProgramResponse { program }))
}

/// List a merchant's programs
pub async fn list_merchant_programs_handler(
    State(state): State<Arc<AppState>>,
    Path(merchant_id): Path<String>,
) -> Result<Json<ListResponse>, ApiError> {
    let ids = state.registry.list_merchant_programs(&merchant_id).await?;
    let total = ids.len();
    Ok(Json(ListResponse { ids, total }))
}

/// Rotate a program's verification key (owner-only)
pub async fn register_key_handler(
    State(state): State<Arc<AppState>>,
    Path(program_id): Path<String>,
    Json(payload): Json<RegisterKeyRequest>,
) -> Result<Json<RegisterKeyResponse>, ApiError> {
    let key_version = state
        .registry
        .register_verification_key(&program_id, &payload.merchant_id, &payload.verification_key)
        .await?;

    info!(
        "Rotated verification key for program {} to version {}",
        program_id, key_version
    );

    Ok(Json(RegisterKeyResponse {
        program_id,
        key_version,
    }))
}
