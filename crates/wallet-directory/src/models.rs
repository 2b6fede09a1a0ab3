//! Data models for the Wallet Directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use veilcoupon_common::{Commitment, WalletAddress};

/// A custodial-free wallet record.
///
/// The address is derived once, from the identity commitment the wallet
/// was created with, and never changes. Recovery rebinds the identity
/// commitment to the same address and strips the old commitment's
/// authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique address, derived from the creating identity commitment
    pub address: WalletAddress,

    /// Commitment currently authorized to act for this wallet
    pub identity_commitment: Commitment,

    /// Commitment that keys recovery proofs
    pub recovery_commitment: Commitment,

    /// When the wallet was created
    pub created_at: DateTime<Utc>,

    /// When the identity was last rebound by recovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<DateTime<Utc>>,
}

impl Wallet {
    pub fn new(identity_commitment: Commitment, recovery_commitment: Commitment) -> Self {
        Self {
            address: WalletAddress::derive(&identity_commitment),
            identity_commitment,
            recovery_commitment,
            created_at: Utc::now(),
            recovered_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_comes_from_identity() {
        let identity = Commitment::new([1u8; 32]);
        let wallet = Wallet::new(identity.clone(), Commitment::new([2u8; 32]));
        assert_eq!(wallet.address, WalletAddress::derive(&identity));
        assert!(wallet.recovered_at.is_none());
    }
}
