use serde::{Deserialize, Serialize};
use veilcoupon_common::Commitment;

/// A registered verification key.
///
/// The version is bumped on every rotation; coupons record the version in
/// force at issuance, so proofs for outstanding coupons keep verifying
/// against the key material they were minted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub bytes: Vec<u8>,
    pub version: u32,
}

impl VerificationKey {
    pub fn new(bytes: Vec<u8>, version: u32) -> Self {
        Self { bytes, version }
    }

    /// Key material stored as hex in registry records
    pub fn from_hex(s: &str, version: u32) -> Result<Self, hex::FromHexError> {
        Ok(Self {
            bytes: hex::decode(s)?,
            version,
        })
    }

    /// Recovery flows use the wallet's recovery commitment as key material.
    pub fn from_commitment(commitment: &Commitment) -> Self {
        Self {
            bytes: commitment.as_bytes().to_vec(),
            version: 0,
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_hex_roundtrip() {
        let key = VerificationKey::new(vec![1, 2, 3, 4], 2);
        let decoded = VerificationKey::from_hex(&key.to_hex(), 2).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_commitment_key_has_version_zero() {
        let key = VerificationKey::from_commitment(&Commitment::new([5u8; 32]));
        assert_eq!(key.version, 0);
        assert_eq!(key.bytes.len(), 32);
    }
}
