//! Storage for wallet records
//!
//! Data model (Redis backend):
//! - wallet:{address} → JSON record
//! - wallet:by-commitment:{hex} → address hex (authority index; rebound
//!   on recovery so stale commitments stop resolving)
//! - wallet:recovering:{address} → recovery serialization lock (SET NX,
//!   short TTL)

use crate::models::Wallet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use veilcoupon_common::{Commitment, Error, Result, WalletAddress};

/// Seconds a recovery may hold the serialization lock
const RECOVERY_LOCK_TTL_SECS: u64 = 30;

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Returns false if the address is already taken
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<bool>;
    async fn get_wallet(&self, address: &WalletAddress) -> Result<Option<Wallet>>;
    /// Resolve the wallet currently bound to an identity commitment
    async fn get_address_by_commitment(
        &self,
        commitment: &Commitment,
    ) -> Result<Option<WalletAddress>>;

    /// Atomically rebind the wallet's identity commitment.
    ///
    /// Succeeds only while the stored commitment still equals `expected`;
    /// concurrent recoveries serialize and the loser observes a changed
    /// commitment and gets `false` (surfaced as RecoveryConflict). The
    /// old commitment's index entry is removed in the same step.
    async fn rebind_identity(
        &self,
        address: &WalletAddress,
        expected: &Commitment,
        new_commitment: &Commitment,
        recovered_at: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Redis-backed wallet store
#[derive(Clone)]
pub struct RedisWalletStore {
    conn: ConnectionManager,
}

impl RedisWalletStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| Error::Storage(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        info!("Wallet store connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn wallet_key(address: &WalletAddress) -> String {
    format!("wallet:{}", address.to_hex())
}

fn commitment_key(commitment: &Commitment) -> String {
    format!("wallet:by-commitment:{}", commitment.to_hex())
}

fn recovery_lock_key(address: &WalletAddress) -> String {
    format!("wallet:recovering:{}", address.to_hex())
}

#[async_trait]
impl WalletStore for RedisWalletStore {
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<bool> {
        let mut conn = self.conn();
        let key = wallet_key(&wallet.address);

        let json = serde_json::to_string(wallet)?;
        let created: bool = conn
            .set_nx(&key, json)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        if !created {
            debug!("Wallet already exists: {}", wallet.address);
            return Ok(false);
        }

        conn.set::<_, _, ()>(
            commitment_key(&wallet.identity_commitment),
            wallet.address.to_hex(),
        )
        .await
        .map_err(|e| Error::Storage(e.to_string()))?;

        info!("Created wallet: {}", wallet.address);
        Ok(true)
    }

    async fn get_wallet(&self, address: &WalletAddress) -> Result<Option<Wallet>> {
        let mut conn = self.conn();

        let json: Option<String> = conn
            .get(wallet_key(address))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn get_address_by_commitment(
        &self,
        commitment: &Commitment,
    ) -> Result<Option<WalletAddress>> {
        let mut conn = self.conn();

        let hex: Option<String> = conn
            .get(commitment_key(commitment))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        match hex {
            Some(h) => Ok(Some(
                WalletAddress::from_hex(&h).map_err(|_| Error::InvalidCommitment)?,
            )),
            None => Ok(None),
        }
    }

    async fn rebind_identity(
        &self,
        address: &WalletAddress,
        expected: &Commitment,
        new_commitment: &Commitment,
        recovered_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn();

        // Serialize concurrent recoveries on the same wallet.
        let lock: Option<String> = redis::cmd("SET")
            .arg(recovery_lock_key(address))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(RECOVERY_LOCK_TTL_SECS)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        if lock.is_none() {
            warn!("Recovery already in progress for wallet {}", address);
            return Ok(false);
        }

        let result = async {
            let Some(mut wallet) = self.get_wallet(address).await? else {
                return Ok(false);
            };

            if wallet.identity_commitment != *expected {
                debug!("Recovery lost the race for wallet {}", address);
                return Ok(false);
            }

            let old_commitment = wallet.identity_commitment.clone();
            wallet.identity_commitment = new_commitment.clone();
            wallet.recovered_at = Some(recovered_at);

            let json = serde_json::to_string(&wallet)?;
            conn.set::<_, _, ()>(wallet_key(address), json)
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;

            // Swap the authority index: the old commitment stops
            // resolving from here on.
            conn.del::<_, ()>(commitment_key(&old_commitment))
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;
            conn.set::<_, _, ()>(commitment_key(new_commitment), address.to_hex())
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;

            info!("Rebound identity for wallet {}", address);
            Ok(true)
        }
        .await;

        conn.del::<_, ()>(recovery_lock_key(address))
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Wallet;

    async fn get_test_store() -> RedisWalletStore {
        RedisWalletStore::new("redis://127.0.0.1:6379/15")
            .await
            .expect("Failed to connect to test Redis")
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_wallet_roundtrip_and_rebind() {
        let store = get_test_store().await;

        let identity = Commitment::new([21u8; 32]);
        let wallet = Wallet::new(identity.clone(), Commitment::new([22u8; 32]));

        assert!(store.insert_wallet(&wallet).await.unwrap());
        assert!(!store.insert_wallet(&wallet).await.unwrap());

        let resolved = store
            .get_address_by_commitment(&identity)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved, wallet.address);

        let new_identity = Commitment::new([23u8; 32]);
        let rebound = store
            .rebind_identity(&wallet.address, &identity, &new_identity, Utc::now())
            .await
            .unwrap();
        assert!(rebound);

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
}
