//! Storage for coupon records
//!
//! Data model (Redis backend):
//! - coupon:{id} → JSON record
//! - coupon:terminal:{id} → terminal marker ("redeemed" | "expired"),
//!   written with SET NX so exactly one terminal transition ever wins
//! - coupons:issued / coupons:redeemed / coupons:expired → state indexes
//! - coupons:by-wallet:{address} → Set of coupon ids
//! - coupons:by-merchant:{merchant_id} → Set of coupon ids
//! - coupons:by-program:{program_id} → Set of coupon ids
//!
//! Reads overlay the terminal marker on the JSON record, so a reader
//! never observes a coupon that lost its terminal race as still issued.

use crate::models::{Coupon, CouponState, LedgerStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};
use veilcoupon_common::{Error, Result, WalletAddress};

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Returns false if the coupon id is already taken
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<bool>;
    async fn get_coupon(&self, token_id: &str) -> Result<Option<Coupon>>;

    /// Compare-and-set `Issued -> Redeemed`. False when the coupon is
    /// unknown or already terminal - at most one caller ever gets true.
    async fn try_redeem(&self, token_id: &str, redeemed_at: DateTime<Utc>) -> Result<bool>;
    /// Compare-and-set `Issued -> Expired`; idempotent from the caller's
    /// perspective (false when already terminal)
    async fn try_expire(&self, token_id: &str) -> Result<bool>;

    async fn wallet_coupons(&self, address: &WalletAddress) -> Result<Vec<String>>;
    async fn merchant_coupons(&self, merchant_id: &str) -> Result<Vec<String>>;
    /// Coupons minted under a program, for cap reconciliation
    async fn program_coupon_count(&self, program_id: &str) -> Result<u64>;
    /// Ids still in `Issued`, for the expiry sweep
    async fn issued_coupon_ids(&self) -> Result<Vec<String>>;

    async fn stats(&self) -> Result<LedgerStats>;
}

/// Redis-backed coupon store
#[derive(Clone)]
pub struct RedisCouponStore {
    conn: ConnectionManager,
}

impl RedisCouponStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| Error::Storage(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!("Coupon store connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn write_record(&self, coupon: &Coupon) -> Result<()> {
        let mut conn = self.conn();
        let json = serde_json::to_string(coupon)?;
        conn.set::<_, _, ()>(coupon_key(&coupon.token_id), json)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }
}

fn coupon_key(id: &str) -> String {
    format!("coupon:{}", id)
}

fn terminal_key(id: &str) -> String {
    format!("coupon:terminal:{}", id)
}

fn by_wallet_key(address: &WalletAddress) -> String {
    format!("coupons:by-wallet:{}", address.to_hex())
}

fn by_merchant_key(merchant_id: &str) -> String {
    format!("coupons:by-merchant:{}", merchant_id)
}

fn by_program_key(program_id: &str) -> String {
    format!("coupons:by-program:{}", program_id)
}

#[async_trait]
impl CouponStore for RedisCouponStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<bool> {
        let mut conn = self.conn();

        let json = serde_json::to_string(coupon)?;
        let created: bool = conn
            .set_nx(coupon_key(&coupon.token_id), json)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        if !created {
            debug!("Coupon already exists: {}", coupon.token_id);
            return Ok(false);
        }

        conn.sadd::<_, _, ()>("coupons:issued", &coupon.token_id)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        conn.sadd::<_, _, ()>(by_wallet_key(&coupon.owner_wallet), &coupon.token_id)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        conn.sadd::<_, _, ()>(by_merchant_key(&coupon.merchant_id), &coupon.token_id)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        conn.sadd::<_, _, ()>(by_program_key(&coupon.program_id), &coupon.token_id)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!(
            "Minted coupon {} under program {}",
            coupon.token_id, coupon.program_id
        );
        Ok(true)
    }

    async fn get_coupon(&self, token_id: &str) -> Result<Option<Coupon>> {
        let mut conn = self.conn();

        let json: Option<String> = conn
            .get(coupon_key(token_id))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        let Some(data) = json else {
            return Ok(None);
        };
        let mut coupon: Coupon = serde_json::from_str(&data)?;

        // The terminal marker wins over a record whose rewrite has not
        // landed yet.
        if coupon.state == CouponState::Issued {
            let marker: Option<String> = conn
                .get(terminal_key(token_id))
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;
            match marker.as_deref() {
                Some("redeemed") => coupon.state = CouponState::Redeemed,
                Some("expired") => coupon.state = CouponState::Expired,
                _ => {}
            }
        }

        Ok(Some(coupon))
    }

    async fn try_redeem(&self, token_id: &str, redeemed_at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.conn();

        let Some(coupon) = self.get_coupon(token_id).await? else {
            return Ok(false);
        };
        if coupon.state != CouponState::Issued {
            return Ok(false);
        }

        let won: bool = conn
            .set_nx(terminal_key(token_id), "redeemed")
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        if !won {
            return Ok(false);
        }

        let mut updated = coupon;
        updated.state = CouponState::Redeemed;
        updated.redeemed_at = Some(redeemed_at);
        self.write_record(&updated).await?;

        conn.srem::<_, _, ()>("coupons:issued", token_id)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        conn.sadd::<_, _, ()>("coupons:redeemed", token_id)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!("Coupon redeemed: {}", token_id);
        Ok(true)
    }

    async fn try_expire(&self, token_id: &str) -> Result<bool> {
        let mut conn = self.conn();

        let Some(coupon) = self.get_coupon(token_id).await? else {
            return Ok(false);
        };
        if coupon.state != CouponState::Issued {
            return Ok(false);
        }

        let won: bool = conn
            .set_nx(terminal_key(token_id), "expired")
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        if !won {
            return Ok(false);
        }

        let mut updated = coupon;
        updated.state = CouponState::Expired;
        self.write_record(&updated).await?;

        conn.srem::<_, _, ()>("coupons:issued", token_id)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        conn.sadd::<_, _, ()>("coupons:expired", token_id)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        debug!("Coupon expired: {}", token_id);
        Ok(true)
    }

    async fn wallet_coupons(&self, address: &WalletAddress) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn
            .smembers(by_wallet_key(address))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(ids)
    }

    async fn merchant_coupons(&self, merchant_id: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn
            .smembers(by_merchant_key(merchant_id))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(ids)
    }

    async fn program_coupon_count(&self, program_id: &str) -> Result<u64> {
        let mut conn = self.conn();
        let count: u64 = conn
            .scard(by_program_key(program_id))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(count)
    }

    async fn issued_coupon_ids(&self) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn
            .smembers("coupons:issued")
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(ids)
    }

    async fn stats(&self) -> Result<LedgerStats> {
        let mut conn = self.conn();

        let issued: u64 = conn
            .scard("coupons:issued")
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        let redeemed: u64 = conn
            .scard("coupons:redeemed")
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        let expired: u64 = conn
            .scard("coupons:expired")
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(LedgerStats {
            issued,
            redeemed,
            expired,
            total: issued + redeemed + expired,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use veilcoupon_common::Commitment;

    async fn get_test_store() -> RedisCouponStore {
        RedisCouponStore::new("redis://127.0.0.1:6379/15")
            .await
            .expect("Failed to connect to test Redis")
    }

    fn coupon(id: &str) -> Coupon {
        let now = Utc::now();
        Coupon::new(
            id.to_string(),
            "m-1".to_string(),
            "p-1".to_string(),
            WalletAddress::new([1u8; 32]),
            Commitment::new([2u8; 32]),
            now,
            now + Duration::hours(1),
            1,
        )
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redeem_and_expire_race_has_one_winner() {
        let store = get_test_store().await;
        store.insert_coupon(&coupon("redis-c-1")).await.unwrap();

        assert!(store.try_redeem("redis-c-1", Utc::now()).await.unwrap());
        assert!(!store.try_expire("redis-c-1").await.unwrap());

        let stored = store.get_coupon("redis-c-1").await.unwrap().unwrap();
        assert_eq!(stored.state, CouponState::Redeemed);
    }
}
