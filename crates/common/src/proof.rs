//! Proof envelope and public-input shapes.
//!
//! The proving system itself is an opaque capability; this module pins
//! down the `(proof, publicInputs)` pair format the rest of the system
//! exchanges with it. Each proof kind carries its own public-input shape
//! and is dispatched to a single verifier capability.

use crate::{Commitment, WalletAddress};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The protocol-level proof kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    /// Binds a purchase-eligibility claim to a program's rules without
    /// revealing purchase line items
    Issuance,
    /// Binds a specific coupon and wallet, preventing cross-coupon replay
    Redemption,
    /// Binds a wallet to a new identity commitment, keyed by the wallet's
    /// recovery commitment
    Recovery,
}

/// Public inputs, tagged by proof kind.
///
/// The verifier recomputes the digest of these from the context it is
/// about to act on; a proof minted for one context never verifies against
/// another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PublicInputs {
    Issuance {
        program_id: String,
        owner_wallet: WalletAddress,
        metadata_commitment: Commitment,
    },
    Redemption {
        token_id: String,
        owner_wallet: WalletAddress,
    },
    Recovery {
        wallet: WalletAddress,
        new_identity_commitment: Commitment,
    },
}

/// Domain separator for public-input digests
const INPUTS_DOMAIN: &[u8] = b"veilcoupon/public-inputs/v1";

impl PublicInputs {
    pub fn kind(&self) -> ProofKind {
        match self {
            PublicInputs::Issuance { .. } => ProofKind::Issuance,
            PublicInputs::Redemption { .. } => ProofKind::Redemption,
            PublicInputs::Recovery { .. } => ProofKind::Recovery,
        }
    }

    /// Compute the canonical digest of these inputs.
    ///
    /// Variable-length fields are length-prefixed so no two distinct
    /// input tuples share an encoding.
    pub fn digest(&self) -> Commitment {
        let mut hasher = Sha256::new();
        hasher.update(INPUTS_DOMAIN);
        match self {
            PublicInputs::Issuance {
                program_id,
                owner_wallet,
                metadata_commitment,
            } => {
                hasher.update([0u8]);
                hasher.update((program_id.len() as u64).to_le_bytes());
                hasher.update(program_id.as_bytes());
                hasher.update(owner_wallet.as_bytes());
                hasher.update(metadata_commitment.as_bytes());
            }
            PublicInputs::Redemption {
                token_id,
                owner_wallet,
            } => {
                hasher.update([1u8]);
                hasher.update((token_id.len() as u64).to_le_bytes());
                hasher.update(token_id.as_bytes());
                hasher.update(owner_wallet.as_bytes());
            }
            PublicInputs::Recovery {
                wallet,
                new_identity_commitment,
            } => {
                hasher.update([2u8]);
                hasher.update(wallet.as_bytes());
                hasher.update(new_identity_commitment.as_bytes());
            }
        }
        Commitment(hasher.finalize().into())
    }
}

/// A submitted proof: the opaque payload plus the digest of the public
/// inputs it claims to attest to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub kind: ProofKind,
    /// Opaque proving-system output
    pub payload: Vec<u8>,
    /// Digest of the public inputs the prover committed to
    pub public_input_digest: Commitment,
}

impl ProofBundle {
    pub fn new(kind: ProofKind, payload: Vec<u8>, public_input_digest: Commitment) -> Self {
        Self {
            kind,
            payload,
            public_input_digest,
        }
    }

    /// Serialize for transport
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    /// Deserialize from transport bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let (bundle, _): (Self, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(bundle)
    }

    /// Hex encoding used in JSON request bodies
    pub fn to_hex(&self) -> crate::Result<String> {
        Ok(hex::encode(self.to_bytes()?))
    }

    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|_| crate::Error::InvalidProof)?;
        Self::from_bytes(&bytes)
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}
