//! Storage for confirmation tokens
//!
//! Data model (Redis backend):
//! - token:{value} → JSON record
//! - token:reserved:{value} → confirmation reservation (SET NX EX)
//!
//! Consumption is two-phase: `begin_confirm` takes the reservation,
//! `finalize_confirm` marks the token used and drops the reservation,
//! `release_confirm` rolls back. A holder that crashes mid-confirmation
//! loses the reservation on its TTL and the token becomes confirmable
//! again; the ledger's coupon-state check-and-set is the idempotence
//! backstop behind that.

use crate::models::{ConfirmationToken, TokenState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use veilcoupon_common::{Error, Result};

/// Reservation TTL - confirmations held for 5 minutes max
const RESERVATION_TTL_SECS: u64 = 300;

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: &ConfirmationToken) -> Result<()>;
    async fn get_token(&self, token: &str) -> Result<Option<ConfirmationToken>>;

    /// Atomically reserve the token for confirmation. Returns false if it
    /// is already reserved or no longer pending - exactly one of any set
    /// of concurrent callers sees true.
    async fn begin_confirm(&self, token: &str) -> Result<bool>;
    /// Mark the reserved token consumed and drop the reservation
    async fn finalize_confirm(&self, token: &str, used_at: DateTime<Utc>) -> Result<()>;
    /// Drop a reservation without consuming the token
    async fn release_confirm(&self, token: &str) -> Result<()>;

    /// Materialize `Expired` for a pending token; idempotent, and skipped
    /// while a confirmation holds the reservation
    async fn mark_expired(&self, token: &str) -> Result<()>;
}

/// Redis-backed token store
#[derive(Clone)]
pub struct RedisTokenStore {
    conn: ConnectionManager,
}

impl RedisTokenStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| Error::Storage(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!("Token store connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

fn reserved_key(token: &str) -> String {
    format!("token:reserved:{}", token)
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn insert_token(&self, token: &ConfirmationToken) -> Result<()> {
        let mut conn = self.conn();

        let json = serde_json::to_string(token)?;
        let created: bool = conn
            .set_nx(token_key(&token.token), json)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        if !created {
            // 256-bit tokens do not collide; a hit means re-issue of the
            // same value, which must never happen.
            return Err(Error::Storage("confirmation token collision".to_string()));
        }

        debug!(
            "Issued {:?} token for wallet {}",
            token.action, token.target_wallet
        );
        Ok(())
    }

    async fn get_token(&self, token: &str) -> Result<Option<ConfirmationToken>> {
        let mut conn = self.conn();

        let json: Option<String> = conn
            .get(token_key(token))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn begin_confirm(&self, token: &str) -> Result<bool> {
        let mut conn = self.conn();

        // SET NX with TTL - atomic reservation (the same primitive the
        // replay check uses; exactly one concurrent caller wins).
        let set_result: Option<String> = redis::cmd("SET")
            .arg(reserved_key(token))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(RESERVATION_TTL_SECS)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        if set_result.is_none() {
            warn!("Confirmation already in progress for token");
            return Ok(false);
        }

        // With the reservation held, re-check the stored state: a
        // finalize that landed between our caller's read and this
        // reservation left the token consumed.
        match self.get_token(token).await? {
            Some(record) if record.state == TokenState::Pending => Ok(true),
            _ => {
                conn.del::<_, ()>(reserved_key(token))
                    .await
                    .map_err(|e| Error::Storage(e.to_string()))?;
                Ok(false)
            }
        }
    }

    async fn finalize_confirm(&self, token: &str, used_at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn();

        let Some(mut record) = self.get_token(token).await? else {
            return Err(Error::TokenNotFound);
        };

        record.state = TokenState::Confirmed;
        record.used_at = Some(used_at);

        let json = serde_json::to_string(&record)?;
        conn.set::<_, _, ()>(token_key(token), json)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        conn.del::<_, ()>(reserved_key(token))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!("Confirmation token consumed");
        Ok(())
    }

    async fn release_confirm(&self, token: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.del::<_, ()>(reserved_key(token))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        debug!("Confirmation reservation released");
        Ok(())
    }

    async fn mark_expired(&self, token: &str) -> Result<()> {
        let mut conn = self.conn();

        let reserved: bool = conn
            .exists(reserved_key(token))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        if reserved {
            return Ok(());
        }

        let Some(mut record) = self.get_token(token).await? else {
            return Ok(());
        };
        if record.state != TokenState::Pending {
            return Ok(());
        }

        record.state = TokenState::Expired;
        let json = serde_json::to_string(&record)?;
        conn.set::<_, _, ()>(token_key(token), json)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        debug!("Confirmation token expired");
        Ok(())
    }
}
