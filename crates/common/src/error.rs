use serde::Serialize;
use thiserror::Error;

/// Stable failure classification surfaced alongside every error.
///
/// Callers branch on the kind, not on message text: Validation and
/// ProofRejected are never retried, Conflict means the credential or slot
/// is gone and a fresh one is needed, Expiry means the flow must restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Expiry,
    ProofRejected,
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("merchant not found: {0}")]
    MerchantNotFound(String),

    #[error("merchant is inactive: {0}")]
    MerchantInactive(String),

    #[error("program not found: {0}")]
    ProgramNotFound(String),

    #[error("invalid program parameters: {0}")]
    InvalidProgramParams(String),

    #[error("caller does not own this program")]
    NotProgramOwner,

    #[error("issuance cap reached")]
    IssuanceCapReached,

    // Deliberately carries no detail: the verifier must not leak which
    // check rejected the proof.
    #[error("invalid proof")]
    InvalidProof,

    #[error("coupon not found: {0}")]
    CouponNotFound(String),

    #[error("coupon expired")]
    CouponExpired,

    #[error("coupon already redeemed")]
    CouponAlreadyRedeemed,

    #[error("confirmation token not found")]
    TokenNotFound,

    #[error("confirmation token expired")]
    TokenExpired,

    #[error("confirmation token already used")]
    TokenAlreadyUsed,

    #[error("confirmation token does not authorize this action")]
    TokenMismatch,

    #[error("wallet already exists")]
    WalletExists,

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("recovery conflict")]
    RecoveryConflict,

    #[error("invalid commitment encoding")]
    InvalidCommitment,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("serialization error: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),

    #[error("deserialization error: {0}")]
    BincodeDecode(#[from] bincode::error::DecodeError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MerchantNotFound(_)
            | Error::MerchantInactive(_)
            | Error::ProgramNotFound(_)
            | Error::InvalidProgramParams(_)
            | Error::NotProgramOwner
            | Error::CouponNotFound(_)
            | Error::TokenNotFound
            | Error::TokenMismatch
            | Error::WalletNotFound(_)
            | Error::InvalidCommitment => ErrorKind::Validation,

            Error::IssuanceCapReached
            | Error::CouponAlreadyRedeemed
            | Error::TokenAlreadyUsed
            | Error::WalletExists
            | Error::RecoveryConflict => ErrorKind::Conflict,

            Error::CouponExpired | Error::TokenExpired => ErrorKind::Expiry,

            Error::InvalidProof => ErrorKind::ProofRejected,

            Error::Storage(_)
            | Error::JsonSerialization(_)
            | Error::BincodeEncode(_)
            | Error::BincodeDecode(_)
            | Error::Other(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
