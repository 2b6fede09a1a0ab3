//! API request handlers for the Confirmation Gateway

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use veilcoupon_common::{Error, ErrorKind, WalletAddress};

use crate::{
    gateway::ConfirmationGateway,
    models::{ConfirmationAction, ConfirmationToken},
    storage::RedisTokenStore,
};

/// Default token lifetime when the caller does not pick one
const DEFAULT_TTL_SECS: i64 = 900;

/// Shared application state
pub struct AppState {
    pub gateway: ConfirmationGateway<RedisTokenStore>,
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
            (Error::TokenNotFound, _) => StatusCode::NOT_FOUND,
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

/// Request to issue a confirmation token
#[derive(Debug, Deserialize)]
pub struct IssueTokenRequest {
    pub action: ConfirmationAction,
    pub target_wallet: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<i64>,
}

/// Issued token response
#[derive(Debug, Serialize)]
pub struct IssueTokenResponse {
    pub token: ConfirmationToken,
}

/// Confirmation result
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub action: ConfirmationAction,
    pub target_wallet: String,
    pub payload: serde_json::Value,
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "confirmation-gateway"
    }))
}

/// Issue a token for a pending action
pub async fn issue_token_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IssueTokenRequest>,
) -> Result<Json<IssueTokenResponse>, ApiError> {
    let wallet = WalletAddress::from_hex(&payload.target_wallet)
        .map_err(|_| ApiError::from(Error::InvalidCommitment))?;

    let ttl = Duration::seconds(payload.ttl_secs.unwrap_or(DEFAULT_TTL_SECS));

    let token = state
        .gateway
        .issue(payload.action, wallet, payload.payload, ttl)
        .await?;

    info!("Issued {:?} token", token.action);
    Ok(Json(IssueTokenResponse { token }))
}

/// Consume a token once
pub async fn confirm_token_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let confirmed = state.gateway.confirm(&token).await?;

    Ok(Json(ConfirmResponse {
        action: confirmed.action,
        target_wallet: confirmed.target_wallet.to_hex(),
        payload: confirmed.payload,
    }))
}
