//! Registry domain logic
//!
//! Owns merchant and program records, issuance caps, and verification-key
//! bindings. Authorization context (which merchant is calling) is passed
//! in by the caller; the registry enforces ownership, activity, and
//! parameter checks.

use crate::models::{Merchant, Program};
use crate::storage::RegistryStore;
use tracing::info;
use uuid::Uuid;
use veilcoupon_common::{Error, Result, WalletAddress};

pub struct Registry<S> {
    store: S,
}

impl<S: RegistryStore> Registry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn register_merchant(&self, wallet_address: WalletAddress) -> Result<Merchant> {
        let merchant = Merchant::new(Uuid::new_v4().to_string(), wallet_address);

        if !self.store.insert_merchant(&merchant).await? {
            // v4 collisions do not happen in practice; a hit means the
            // store is corrupt.
            return Err(Error::Storage(format!(
                "merchant id collision: {}",
                merchant.merchant_id
            )));
        }

        info!("Merchant registered: {}", merchant.merchant_id);
        Ok(merchant)
    }

    pub async fn update_merchant_details(
        &self,
        merchant_id: &str,
        wallet_address: WalletAddress,
    ) -> Result<Merchant> {
        let mut merchant = self.require_merchant(merchant_id).await?;
        merchant.wallet_address = wallet_address;

        if !self.store.update_merchant(&merchant).await? {
            return Err(Error::MerchantNotFound(merchant_id.to_string()));
        }
        Ok(merchant)
    }

    /// Merchants are never deleted; coupons reference them permanently.
    pub async fn deactivate_merchant(&self, merchant_id: &str) -> Result<Merchant> {
        let mut merchant = self.require_merchant(merchant_id).await?;
        merchant.active = false;

        if !self.store.update_merchant(&merchant).await? {
            return Err(Error::MerchantNotFound(merchant_id.to_string()));
        }

        info!("Merchant deactivated: {}", merchant_id);
        Ok(merchant)
    }

    pub async fn get_merchant(&self, merchant_id: &str) -> Result<Option<Merchant>> {
        self.store.get_merchant(merchant_id).await
    }

    pub async fn require_merchant(&self, merchant_id: &str) -> Result<Merchant> {
        self.store
            .get_merchant(merchant_id)
            .await?
            .ok_or_else(|| Error::MerchantNotFound(merchant_id.to_string()))
    }

    pub async fn require_active_merchant(&self, merchant_id: &str) -> Result<Merchant> {
        let merchant = self.require_merchant(merchant_id).await?;
        if !merchant.active {
            return Err(Error::MerchantInactive(merchant_id.to_string()));
        }
        Ok(merchant)
    }

    pub async fn list_merchants(&self) -> Result<Vec<String>> {
        self.store.list_merchants().await
    }

    pub async fn create_program(
        &self,
        merchant_id: &str,
        validity_secs: i64,
        max_issuance: u64,
        verification_key: &str,
    ) -> Result<Program> {
        self.require_active_merchant(merchant_id).await?;

        if max_issuance == 0 {
            return Err(Error::InvalidProgramParams(
                "max_issuance must be strictly positive".to_string(),
            ));
        }
        if validity_secs <= 0 {
            return Err(Error::InvalidProgramParams(
                "validity period must be strictly positive".to_string(),
            ));
        }
        validate_key_hex(verification_key)?;

        let program = Program::new(
            Uuid::new_v4().to_string(),
            merchant_id.to_string(),
            validity_secs,
            max_issuance,
            verification_key.to_string(),
        );

        if !self.store.insert_program(&program).await? {
            return Err(Error::Storage(format!(
                "program id collision: {}",
                program.program_id
            )));
        }

        Ok(program)
    }

    pub async fn get_program(&self, program_id: &str) -> Result<Option<Program>> {
        self.store.get_program(program_id).await
    }

    pub async fn require_program(&self, program_id: &str) -> Result<Program> {
        self.store
            .get_program(program_id)
            .await?
            .ok_or_else(|| Error::ProgramNotFound(program_id.to_string()))
    }

    pub async fn list_merchant_programs(&self, merchant_id: &str) -> Result<Vec<String>> {
        self.store.list_merchant_programs(merchant_id).await
    }

    /// Rotate a program's verification key. Owner-only; coupons issued
    /// under prior versions stay redeemable through the version recorded
    /// on them.
    pub async fn register_verification_key(
        &self,
        program_id: &str,
        caller_merchant_id: &str,
        verification_key: &str,
    ) -> Result<u32> {
        let program = self.require_program(program_id).await?;
        if program.merchant_id != caller_merchant_id {
            return Err(Error::NotProgramOwner);
        }
        validate_key_hex(verification_key)?;

        self.store
            .rotate_verification_key(program_id, verification_key)
            .await
    }

    pub async fn get_verification_key(
        &self,
        program_id: &str,
        version: u32,
    ) -> Result<Option<String>> {
        self.store.get_verification_key(program_id, version).await
    }

    pub async fn reserve_issuance_slot(&self, program_id: &str) -> Result<u64> {
        self.store.reserve_issuance_slot(program_id).await
    }

    pub async fn release_issuance_slot(&self, program_id: &str) -> Result<()> {
        self.store.release_issuance_slot(program_id).await
    }

    pub async fn set_issued_count(&self, program_id: &str, count: u64) -> Result<()> {
        self.store.set_issued_count(program_id, count).await
    }
}

fn validate_key_hex(key: &str) -> Result<()> {
    if key.is_empty() || hex::decode(key).is_err() {
        return Err(Error::InvalidProgramParams(
            "verification key must be non-empty hex".to_string(),
        ));
    }
    Ok(())
}
