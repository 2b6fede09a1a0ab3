//! Proof Verifier
//!
//! Stateless verification capability for issuance, redemption, and
//! recovery proofs. Verification is a pure function of the submitted
//! bundle, the expected public inputs, and a registered verification key;
//! it is safe to invoke concurrently without synchronization.

pub mod keys;
pub mod verifier;

pub use keys::VerificationKey;
pub use verifier::{seal, Verifier};
