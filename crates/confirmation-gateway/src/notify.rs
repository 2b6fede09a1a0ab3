//! Delivery notification
//!
//! The gateway emits token-issued events to the out-of-band delivery
//! service (email, push) over a webhook; it never sends user-facing
//! messages itself. Delivery failures are logged and do not fail the
//! issuing flow - the token simply expires unconfirmed.

use crate::models::{ConfirmationToken, TokenIssuedEvent};
use tracing::{info, warn};

/// Webhook client for the delivery service
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl Notifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    /// Hand a freshly issued token to the delivery service
    pub async fn token_issued(&self, token: &ConfirmationToken) {
        let event = TokenIssuedEvent::from_token(token);

        match self
            .client
            .post(&self.webhook_url)
            .json(&event)
            .send()
            .await
        {
            Ok(response) => {
                if response.status().is_success() {
                    info!(
                        "Delivery webhook accepted {:?} token for wallet {}",
                        event.action, event.target_wallet
                    );
                } else {
                    warn!(
                        "Delivery webhook returned status {} for wallet {}",
                        response.status(),
                        event.target_wallet
                    );
                }
            }
            Err(e) => {
                warn!("Failed to reach delivery webhook: {}", e);
            }
        }
    }
}
