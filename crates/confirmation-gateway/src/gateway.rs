//! Confirmation gateway domain logic
//!
//! Issues and consumes single-use confirmation tokens. Consumption runs
//! the token state machine: unknown → TokenNotFound, past expiry →
//! TokenExpired (materializing the stored state), consumed →
//! TokenAlreadyUsed, otherwise an atomic check-and-set that exactly one
//! concurrent caller wins.

use crate::models::{ConfirmationAction, ConfirmationToken, TokenState};
use crate::notify::Notifier;
use crate::storage::TokenStore;
use chrono::{Duration, Utc};
use rand::RngCore;
use tracing::info;
use veilcoupon_common::{Error, Result, WalletAddress};

/// The action and bindings a consumed token authorized
#[derive(Debug, Clone)]
pub struct ConfirmedAction {
    pub action: ConfirmationAction,
    pub target_wallet: WalletAddress,
    pub payload: serde_json::Value,
}

pub struct ConfirmationGateway<S> {
    store: S,
    notifier: Option<Notifier>,
}

impl<S: TokenStore> ConfirmationGateway<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    pub fn with_notifier(store: S, notifier: Notifier) -> Self {
        Self {
            store,
            notifier: Some(notifier),
        }
    }

    /// Mint a token for a pending action and hand it to the delivery
    /// service.
    ///
    /// A new token is minted per pending action even if earlier ones for
    /// the same wallet/action are still outstanding; each is
    /// independently single-use and expires on its own schedule.
    pub async fn issue(
        &self,
        action: ConfirmationAction,
        target_wallet: WalletAddress,
        payload: serde_json::Value,
        ttl: Duration,
    ) -> Result<ConfirmationToken> {
        let token = ConfirmationToken::new(generate_token(), action, target_wallet, payload, ttl);

        self.store.insert_token(&token).await?;

        if let Some(notifier) = &self.notifier {
            notifier.token_issued(&token).await;
        }

        info!(
            "Issued {:?} confirmation token for wallet {}",
            token.action, token.target_wallet
        );
        Ok(token)
    }

    pub async fn get_token(&self, token: &str) -> Result<Option<ConfirmationToken>> {
        self.store.get_token(token).await
    }

    /// Reserve a token for confirmation and return its bindings.
    ///
    /// Callers that need to join the consumption with another state
    /// transition (coupon redemption) hold the reservation across their
    /// own transition and then `finalize` or `release`.
    pub async fn begin(&self, token: &str) -> Result<ConfirmationToken> {
        let record = self
            .store
            .get_token(token)
            .await?
            .ok_or(Error::TokenNotFound)?;

        match record.state {
            TokenState::Confirmed => return Err(Error::TokenAlreadyUsed),
            TokenState::Expired => return Err(Error::TokenExpired),
            TokenState::Pending => {}
        }

        if record.is_expired(Utc::now()) {
            // Lazy expiry: materialize the terminal state on observation.
            self.store.mark_expired(token).await?;
            return Err(Error::TokenExpired);
        }

        if !self.store.begin_confirm(token).await? {
            return Err(Error::TokenAlreadyUsed);
        }

        Ok(record)
    }

    pub async fn finalize(&self, token: &str) -> Result<()> {
        self.store.finalize_confirm(token, Utc::now()).await
    }

    pub async fn release(&self, token: &str) -> Result<()> {
        self.store.release_confirm(token).await
    }

    /// Consume a token in one step and return what it authorized.
    ///
    /// # Arguments
    /// * `token` - The token value the user received out-of-band
    ///
    /// # Returns
    /// * `Ok(ConfirmedAction)` - This caller consumed the token
    /// * `Err(TokenNotFound | TokenExpired | TokenAlreadyUsed)` - The
    ///   token cannot authorize anything (anymore)
    pub async fn confirm(&self, token: &str) -> Result<ConfirmedAction> {
        let record = self.begin(token).await?;
        self.finalize(token).await?;

        Ok(ConfirmedAction {
            action: record.action,
            target_wallet: record.target_wallet,
            payload: record.payload,
        })
    }
}

/// 256-bit random token, hex-encoded
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
