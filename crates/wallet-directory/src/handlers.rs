//! API request handlers for the Wallet Directory
//!
//! Consumed by the authentication/identity service: identity commitments
//! come in, raw identifiers never do.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use veilcoupon_common::{Commitment, Error, ErrorKind, ProofBundle, WalletAddress};

use crate::{directory::WalletDirectory, models::Wallet, storage::RedisWalletStore};

/// Shared application state
pub struct AppState {
    pub directory: WalletDirectory<RedisWalletStore>,
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
            (Error::WalletNotFound(_), _) => StatusCode::NOT_FOUND,
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

fn parse_commitment(hex: &str) -> Result<Commitment, ApiError> {
    Commitment::from_hex(hex).map_err(|_| ApiError::from(Error::InvalidCommitment))
}

/// Request to create a wallet
#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub identity_commitment: String,
    pub recovery_commitment: String,
}

/// Request to recover a wallet
#[derive(Debug, Deserialize)]
pub struct RecoverWalletRequest {
    pub new_identity_commitment: String,
    /// Hex-encoded proof bundle
    pub recovery_proof: String,
}

/// Wallet info response
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub wallet: Wallet,
}

/// Address lookup response
#[derive(Debug, Serialize)]
pub struct AddressResponse {
    pub address: String,
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "wallet-directory"
    }))
}

/// Create a wallet for an identity commitment
pub async fn create_wallet_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateWalletRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    let identity = parse_commitment(&payload.identity_commitment)?;
    let recovery = parse_commitment(&payload.recovery_commitment)?;

    let wallet = state.directory.create_wallet(identity, recovery).await?;

    info!("Created wallet: {}", wallet.address);
    Ok(Json(WalletResponse { wallet }))
}

/// Resolve the wallet address for an identity commitment
pub async fn get_address_handler(
    State(state): State<Arc<AppState>>,
    Path(commitment): Path<String>,
) -> Result<Json<AddressResponse>, ApiError> {
    let commitment = parse_commitment(&commitment)?;

    match state.directory.get_wallet_address(&commitment).await? {
        Some(address) => Ok(Json(AddressResponse {
            address: address.to_hex(),
        })),
        None => Err(ApiError {
            status: StatusCode::NOT_FOUND,
            kind: ErrorKind::Validation,
            message: "no wallet for this identity commitment".to_string(),
        }),
    }
}

/// Get a wallet record by address
pub async fn get_wallet_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<WalletResponse>, ApiError> {
    let address =
        WalletAddress::from_hex(&address).map_err(|_| ApiError::from(Error::InvalidCommitment))?;

    let wallet = state.directory.require_wallet(&address).await?;
    Ok(Json(WalletResponse { wallet }))
}

/// Recover a wallet, rebinding its identity commitment
pub async fn recover_wallet_handler(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Json(payload): Json<RecoverWalletRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    let address =
        WalletAddress::from_hex(&address).map_err(|_| ApiError::from(Error::InvalidCommitment))?;
    let new_identity = parse_commitment(&payload.new_identity_commitment)?;
    let proof = ProofBundle::from_hex(&payload.recovery_proof)?;

    let wallet = state
        .directory
        .recover_wallet(&address, new_identity, &proof)
        .await?;

    info!("Recovered wallet: {}", wallet.address);
    Ok(Json(WalletResponse { wallet }))
}
