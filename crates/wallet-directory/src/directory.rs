//! Wallet directory domain logic
//!
//! Maps identity commitments to wallet records. Addresses derive
//! deterministically from the creating commitment; after a recovery the
//! commitment index, not re-derivation, is the authority for lookups.

use crate::models::Wallet;
use crate::storage::WalletStore;
use chrono::Utc;
use proof_verifier::{VerificationKey, Verifier};
use tracing::info;
use veilcoupon_common::{Commitment, Error, ProofBundle, PublicInputs, Result, WalletAddress};

pub struct WalletDirectory<S> {
    store: S,
    verifier: Verifier,
}

impl<S: WalletStore> WalletDirectory<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            verifier: Verifier::new(),
        }
    }

    /// Create the wallet for an identity commitment.
    ///
    /// Derivation is deterministic, so re-creation for the same identity
    /// fails with WalletExists; callers that only need the address should
    /// use `get_wallet_address` instead.
    pub async fn create_wallet(
        &self,
        identity_commitment: Commitment,
        recovery_commitment: Commitment,
    ) -> Result<Wallet> {
        let wallet = Wallet::new(identity_commitment, recovery_commitment);

        if !self.store.insert_wallet(&wallet).await? {
            return Err(Error::WalletExists);
        }

        info!("Wallet created: {}", wallet.address);
        Ok(wallet)
    }

    /// Idempotent lookup of the wallet bound to an identity commitment.
    ///
    /// Resolves through the authority index: after a recovery, the old
    /// commitment no longer resolves even though the derivation function
    /// would still produce the address.
    pub async fn get_wallet_address(
        &self,
        identity_commitment: &Commitment,
    ) -> Result<Option<WalletAddress>> {
        self.store
            .get_address_by_commitment(identity_commitment)
            .await
    }

    pub async fn get_wallet(&self, address: &WalletAddress) -> Result<Option<Wallet>> {
        self.store.get_wallet(address).await
    }

    pub async fn require_wallet(&self, address: &WalletAddress) -> Result<Wallet> {
        self.store
            .get_wallet(address)
            .await?
            .ok_or_else(|| Error::WalletNotFound(address.to_hex()))
    }

    /// Rebind a wallet to a new identity commitment.
    ///
    /// The recovery proof is keyed by the wallet's stored recovery
    /// commitment and binds this wallet and the new identity commitment;
    /// a proof minted for a different wallet or commitment is rejected.
    /// Concurrent recoveries serialize; the loser gets RecoveryConflict.
    pub async fn recover_wallet(
        &self,
        address: &WalletAddress,
        new_identity_commitment: Commitment,
        recovery_proof: &ProofBundle,
    ) -> Result<Wallet> {
        let wallet = self.require_wallet(address).await?;

        let expected = PublicInputs::Recovery {
            wallet: address.clone(),
            new_identity_commitment: new_identity_commitment.clone(),
        };
        let key = VerificationKey::from_commitment(&wallet.recovery_commitment);

        if !self.verifier.verify(recovery_proof, &expected, &key) {
            return Err(Error::InvalidProof);
        }

        let rebound = self
            .store
            .rebind_identity(
                address,
                &wallet.identity_commitment,
                &new_identity_commitment,
                Utc::now(),
            )
            .await?;

        if !rebound {
            return Err(Error::RecoveryConflict);
        }

        info!("Wallet recovered: {}", address);
        self.require_wallet(address).await
    }
}
