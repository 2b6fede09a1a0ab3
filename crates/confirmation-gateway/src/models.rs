//! Data models for the Confirmation Gateway

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use veilcoupon_common::WalletAddress;

/// Actions a confirmation token may authorize
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationAction {
    Register,
    Login,
    Redeem,
    Recover,
}

/// Token lifecycle state
///
/// `Pending -> Confirmed` and `Pending -> Expired` are the only
/// transitions; both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Pending,
    Confirmed,
    Expired,
}

/// A single-use, time-limited confirmation token.
///
/// Bound to one pending action for one wallet; every field except the
/// consumption state is immutable after issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationToken {
    /// Unguessable token value, delivered out-of-band
    pub token: String,

    /// The action this token authorizes
    pub action: ConfirmationAction,

    /// The wallet whose owner must confirm
    pub target_wallet: WalletAddress,

    /// Action-specific payload (e.g. the coupon id for a redemption)
    pub payload: serde_json::Value,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    pub state: TokenState,

    /// When the token was consumed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
}

impl ConfirmationToken {
    pub fn new(
        token: String,
        action: ConfirmationAction,
        target_wallet: WalletAddress,
        payload: serde_json::Value,
        ttl: Duration,
    ) -> Self {
        let issued_at = Utc::now();
        Self {
            token,
            action,
            target_wallet,
            payload,
            issued_at,
            expires_at: issued_at + ttl,
            state: TokenState::Pending,
            used_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn used(&self) -> bool {
        self.state == TokenState::Confirmed
    }
}

/// Event emitted to the out-of-band delivery service on issue.
///
/// The gateway never sends user-facing messages itself.
#[derive(Debug, Clone, Serialize)]
pub struct TokenIssuedEvent {
    pub token: String,
    pub action: ConfirmationAction,
    pub target_wallet: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenIssuedEvent {
    pub fn from_token(token: &ConfirmationToken) -> Self {
        Self {
            token: token.token.clone(),
            action: token.action,
            target_wallet: token.target_wallet.to_hex(),
            expires_at: token.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_pending() {
        let token = ConfirmationToken::new(
            "tok".to_string(),
            ConfirmationAction::Redeem,
            WalletAddress::new([1u8; 32]),
            serde_json::json!({"token_id": "c-1"}),
            Duration::minutes(10),
        );
        assert_eq!(token.state, TokenState::Pending);
        assert!(!token.used());
        assert!(!token.is_expired(Utc::now()));
    }

    #[test]
    fn test_negative_ttl_expires_immediately() {
        let token = ConfirmationToken::new(
            "tok".to_string(),
            ConfirmationAction::Login,
            WalletAddress::new([1u8; 32]),
            serde_json::Value::Null,
            Duration::seconds(-1),
        );
        assert!(token.is_expired(Utc::now()));
    }
}
