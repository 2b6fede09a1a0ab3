//! Data models for the Coupon Ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use veilcoupon_common::{Commitment, WalletAddress};

/// Coupon lifecycle state.
///
/// `Issued -> Redeemed` and `Issued -> Expired` are the only transitions;
/// both targets are terminal. `Invalid` tags a rejected pre-issuance
/// attempt and is never assigned to a persisted coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponState {
    Issued,
    Redeemed,
    Expired,
    Invalid,
}

/// A single-use coupon credential.
///
/// `owner_wallet` is immutable after mint - coupons are not transferable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    /// Unique coupon identifier
    pub token_id: String,

    /// Merchant that owns the issuing program
    pub merchant_id: String,

    /// Program this coupon was minted under
    pub program_id: String,

    /// Wallet the coupon is bound to
    pub owner_wallet: WalletAddress,

    /// Commitment to the coupon metadata (discount terms, line items)
    pub metadata_commitment: Commitment,

    pub issued_at: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,

    /// Verification-key version in force at issuance; redemption proofs
    /// verify against this version, so key rotation never strands the
    /// coupon
    pub key_version: u32,

    pub state: CouponState,

    /// When the coupon was redeemed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl Coupon {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        token_id: String,
        merchant_id: String,
        program_id: String,
        owner_wallet: WalletAddress,
        metadata_commitment: Commitment,
        issued_at: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
        key_version: u32,
    ) -> Self {
        Self {
            token_id,
            merchant_id,
            program_id,
            owner_wallet,
            metadata_commitment,
            issued_at,
            expiry_date,
            key_version,
            state: CouponState::Issued,
            redeemed_at: None,
        }
    }

    /// Computed freshly from the stored timestamp; the stored state flag
    /// is not trusted for expiry (lazy expiry).
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.state == CouponState::Issued && now < self.expiry_date
    }
}

/// Ledger-wide counters
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStats {
    pub issued: u64,
    pub redeemed: u64,
    pub expired: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(expiry_offset_secs: i64) -> Coupon {
        let now = Utc::now();
        Coupon::new(
            "c-1".to_string(),
            "m-1".to_string(),
            "p-1".to_string(),
            WalletAddress::new([1u8; 32]),
            Commitment::new([2u8; 32]),
            now,
            now + Duration::seconds(expiry_offset_secs),
            1,
        )
    }

    #[test]
    fn test_fresh_coupon_is_valid() {
        assert!(coupon(3600).is_valid(Utc::now()));
    }

    #[test]
    fn test_past_expiry_is_invalid_without_any_write() {
        let coupon = coupon(-1);
        assert_eq!(coupon.state, CouponState::Issued);
        assert!(!coupon.is_valid(Utc::now()));
    }

    #[test]
    fn test_redeemed_coupon_is_invalid() {
        let mut coupon = coupon(3600);
        coupon.state = CouponState::Redeemed;
        assert!(!coupon.is_valid(Utc::now()));
    }
}
