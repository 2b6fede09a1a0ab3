//! In-memory wallet store for development and testing

use crate::models::Wallet;
use crate::storage::WalletStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use veilcoupon_common::{Commitment, Result, WalletAddress};

#[derive(Default)]
struct Inner {
    wallets: HashMap<WalletAddress, Wallet>,
    by_commitment: HashMap<Commitment, WalletAddress>,
}

/// In-memory wallet store
#[derive(Clone, Default)]
pub struct MemoryWalletStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for MemoryWalletStore {
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.wallets.contains_key(&wallet.address) {
            return Ok(false);
        }
        inner
            .by_commitment
            .insert(wallet.identity_commitment.clone(), wallet.address.clone());
        inner.wallets.insert(wallet.address.clone(), wallet.clone());
        Ok(true)
    }

    async fn get_wallet(&self, address: &WalletAddress) -> Result<Option<Wallet>> {
        let inner = self.inner.lock().await;
        Ok(inner.wallets.get(address).cloned())
    }

    async fn get_address_by_commitment(
        &self,
        commitment: &Commitment,
    ) -> Result<Option<WalletAddress>> {
        let inner = self.inner.lock().await;
        Ok(inner.by_commitment.get(commitment).cloned())
    }

    async fn rebind_identity(
        &self,
        address: &WalletAddress,
        expected: &Commitment,
        new_commitment: &Commitment,
        recovered_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;

        let Some(wallet) = inner.wallets.get(address) else {
            return Ok(false);
        };
        if wallet.identity_commitment != *expected {
            return Ok(false);
        }

        let old_commitment = wallet.identity_commitment.clone();
        let mut updated = wallet.clone();
        updated.identity_commitment = new_commitment.clone();
        updated.recovered_at = Some(recovered_at);

        inner.by_commitment.remove(&old_commitment);
        inner
            .by_commitment
            .insert(new_commitment.clone(), address.clone());
        inner.wallets.insert(address.clone(), updated);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stale_commitment_stops_resolving() {
        let store = MemoryWalletStore::new();
        let identity = Commitment::new([1u8; 32]);
        let wallet = Wallet::new(identity.clone(), Commitment::new([2u8; 32]));
        store.insert_wallet(&wallet).await.unwrap();

        let new_identity = Commitment::new([3u8; 32]);
        assert!(store
            .rebind_identity(&wallet.address, &identity, &new_identity, Utc::now())
            .await
            .unwrap());

        assert!(store
            .get_address_by_commitment(&identity)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .get_address_by_commitment(&new_identity)
                .await
                .unwrap()
                .unwrap(),
            wallet.address
        );
    }

    #[tokio::test]
    async fn test_rebind_with_stale_expectation_fails() {
        let store = MemoryWalletStore::new();
        let identity = Commitment::new([1u8; 32]);
        let wallet = Wallet::new(identity.clone(), Commitment::new([2u8; 32]));
        store.insert_wallet(&wallet).await.unwrap();

        let first = Commitment::new([3u8; 32]);
        let second = Commitment::new([4u8; 32]);

        assert!(store
            .rebind_identity(&wallet.address, &identity, &first, Utc::now())
            .await
            .unwrap());

        // The second recovery still expects the original commitment and
        // must lose rather than silently overwrite.
        assert!(!store
            .rebind_identity(&wallet.address, &identity, &second, Utc::now())
            .await
            .unwrap());
    }
}
