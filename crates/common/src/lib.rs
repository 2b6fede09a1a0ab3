pub mod commitment;
pub mod error;
pub mod proof;

pub use commitment::{Commitment, WalletAddress};
pub use error::{Error, ErrorKind, Result};
pub use proof::{ProofBundle, ProofKind, PublicInputs};
