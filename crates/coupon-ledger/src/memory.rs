//! In-memory coupon store for development and testing.
//!
//! All transitions run under one lock; the terminal-state race the Redis
//! backend settles with its marker key is settled here by the lock.

use crate::models::{Coupon, CouponState, LedgerStats};
use crate::storage::CouponStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use veilcoupon_common::{Result, WalletAddress};

/// In-memory coupon store
#[derive(Clone, Default)]
pub struct MemoryCouponStore {
    inner: Arc<Mutex<HashMap<String, Coupon>>>,
}

impl MemoryCouponStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponStore for MemoryCouponStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.contains_key(&coupon.token_id) {
            return Ok(false);
        }
        inner.insert(coupon.token_id.clone(), coupon.clone());
        Ok(true)
    }

    async fn get_coupon(&self, token_id: &str) -> Result<Option<Coupon>> {
        let inner = self.inner.lock().await;
        Ok(inner.get(token_id).cloned())
    }

    async fn try_redeem(&self, token_id: &str, redeemed_at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.get_mut(token_id) {
            Some(coupon) if coupon.state == CouponState::Issued => {
                coupon.state = CouponState::Redeemed;
                coupon.redeemed_at = Some(redeemed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn try_expire(&self, token_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.get_mut(token_id) {
            Some(coupon) if coupon.state == CouponState::Issued => {
                coupon.state = CouponState::Expired;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn wallet_coupons(&self, address: &WalletAddress) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .values()
            .filter(|c| c.owner_wallet == *address)
            .map(|c| c.token_id.clone())
            .collect())
    }

    async fn merchant_coupons(&self, merchant_id: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .values()
            .filter(|c| c.merchant_id == merchant_id)
            .map(|c| c.token_id.clone())
            .collect())
    }

    async fn program_coupon_count(&self, program_id: &str) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(inner.values().filter(|c| c.program_id == program_id).count() as u64)
    }

    async fn issued_coupon_ids(&self) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .values()
            .filter(|c| c.state == CouponState::Issued)
            .map(|c| c.token_id.clone())
            .collect())
    }

    async fn stats(&self) -> Result<LedgerStats> {
        let inner = self.inner.lock().await;
        let mut stats = LedgerStats {
            issued: 0,
            redeemed: 0,
            expired: 0,
            total: inner.len() as u64,
        };
        for coupon in inner.values() {
            match coupon.state {
                CouponState::Issued => stats.issued += 1,
                CouponState::Redeemed => stats.redeemed += 1,
                CouponState::Expired => stats.expired += 1,
                CouponState::Invalid => {}
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use veilcoupon_common::Commitment;

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
    async fn test_redeem_wins_only_once() {
        let store = MemoryCouponStore::new();
        store.insert_coupon(&coupon("c-1")).await.unwrap();

        assert!(store.try_redeem("c-1", Utc::now()).await.unwrap());
        assert!(!store.try_redeem("c-1", Utc::now()).await.unwrap());
        assert!(!store.try_expire("c-1").await.unwrap());

        let stored = store.get_coupon("c-1").await.unwrap().unwrap();
        assert_eq!(stored.state, CouponState::Redeemed);
        assert!(stored.redeemed_at.is_some());
    }

    #[tokio::test]
    async fn test_expire_blocks_later_redeem() {
        let store = MemoryCouponStore::new();
        store.insert_coupon(&coupon("c-2")).await.unwrap();

        assert!(store.try_expire("c-2").await.unwrap());
        assert!(!store.try_redeem("c-2", Utc::now()).await.unwrap());

        let stored = store.get_coupon("c-2").await.unwrap().unwrap();
        assert_eq!(stored.state, CouponState::Expired);
    }

    #[tokio::test]
    async fn test_stats_track_states() {
        let store = MemoryCouponStore::new();
        store.insert_coupon(&coupon("c-3")).await.unwrap();
        store.insert_coupon(&coupon("c-4")).await.unwrap();
        store.try_redeem("c-4", Utc::now()).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.issued, 1);
        assert_eq!(stats.redeemed, 1);
        assert_eq!(stats.total, 2);
    }
}
