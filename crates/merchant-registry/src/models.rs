//! Data models for the Merchant/Program Registry

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use veilcoupon_common::WalletAddress;

/// A registered merchant.
///
/// Merchants are deactivated, never deleted: issued coupons reference
/// them permanently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    /// Unique merchant identifier
    pub merchant_id: String,

    /// Payout wallet for this merchant
    pub wallet_address: WalletAddress,

    /// Inactive merchants cannot create programs or issue coupons
    pub active: bool,

    /// When the merchant registered
    pub created_at: DateTime<Utc>,
}

impl Merchant {
    pub fn new(merchant_id: String, wallet_address: WalletAddress) -> Self {
        Self {
            merchant_id,
            wallet_address,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// A coupon program owned by a merchant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Unique program identifier
    pub program_id: String,

    /// Owning merchant
    pub merchant_id: String,

    /// Coupon validity period in seconds, applied at issuance
    pub validity_secs: i64,

    /// Maximum number of coupons this program may ever mint
    pub max_issuance: u64,

    /// Coupons minted so far; monotonic, never exceeds `max_issuance`
    pub issued_count: u64,

    /// Current verification key (hex)
    pub verification_key: String,

    /// Rotation version of the current key; starts at 1
    pub key_version: u32,

    /// When the program was created
    pub created_at: DateTime<Utc>,
}

impl Program {
    pub fn new(
        program_id: String,
        merchant_id: String,
        validity_secs: i64,
        max_issuance: u64,
        verification_key: String,
    ) -> Self {
        Self {
            program_id,
            merchant_id,
            validity_secs,
            max_issuance,
            issued_count: 0,
            verification_key,
            key_version: 1,
            created_at: Utc::now(),
        }
    }

    /// Validity period as a duration
    pub fn validity(&self) -> Duration {
        Duration::seconds(self.validity_secs)
    }
}
