//! Verification of submitted proof bundles.
//!
//! The production proving system is swappable; this module defines the
//! contract every backend must satisfy and ships the transparent
//! reference backend: a proof payload is the domain-separated SHA-256
//! binding of the verification key and the public-input digest. `seal`
//! is the reference prover for that format, used by tests and by the
//! external proof-generation service contract.

use crate::keys::VerificationKey;
use sha2::{Digest, Sha256};
use veilcoupon_common::{Commitment, ProofBundle, PublicInputs};

/// Domain separator for proof payload bindings
const PROOF_DOMAIN: &[u8] = b"veilcoupon/proof-binding/v1";

/// Stateless proof verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verifier;

impl Verifier {
    pub fn new() -> Self {
        Self
    }

    /// Verify a proof bundle against the public inputs the caller is
    /// about to act on and a registered verification key.
    ///
    /// Fails closed: a kind mismatch, a digest that does not match the
    /// recomputed context, a payload of the wrong shape, or the wrong key
    /// all yield `false`. No failure is distinguishable from another.
    pub fn verify(
        &self,
        proof: &ProofBundle,
        expected: &PublicInputs,
        key: &VerificationKey,
    ) -> bool {
        if proof.kind != expected.kind() {
            return false;
        }

        // Recompute the digest from the claimed context rather than
        // trusting the caller-supplied one. A proof minted for a
        // different coupon or program carries a different digest and is
        // rejected here.
        let digest = expected.digest();
        if proof.public_input_digest != digest {
            return false;
        }

        let expected_payload = binding(key, &digest);
        proof.payload.as_slice() == expected_payload
    }
}

/// Produce a proof bundle for the given inputs under a key.
///
/// Reference implementation of the proving-service contract. A SNARK
/// backend replaces this (and the payload comparison in `verify`) behind
/// the same signatures.
pub fn seal(inputs: &PublicInputs, key: &VerificationKey) -> ProofBundle {
    let digest = inputs.digest();
    ProofBundle::new(inputs.kind(), binding(key, &digest).to_vec(), digest)
}

fn binding(key: &VerificationKey, digest: &Commitment) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(PROOF_DOMAIN);
    hasher.update(key.version.to_le_bytes());
    hasher.update((key.bytes.len() as u64).to_le_bytes());
    hasher.update(&key.bytes);
    hasher.update(digest.as_bytes());
    hasher.finalize().into()
}
