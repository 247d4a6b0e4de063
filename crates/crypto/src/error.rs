//! Crypto error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("empty payload cannot be embedded")]
    EmptyPayload,

    #[error("no embeddable curve point found after {0} trials")]
    Unencodable(usize),

    #[error("point x-coordinate too short to carry a payload")]
    NotAMessage,

    #[error("invalid padding")]
    BadPadding,

    #[error("invalid encoding length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("invalid curve point encoding")]
    InvalidPoint,

    #[error("the identity element has no fixed-width encoding")]
    IdentityPoint,

    #[error("scalar is not invertible")]
    NonInvertibleScalar,

    #[error("hash-to-curve failed")]
    HashToCurve,

    #[error("key derivation failed")]
    KeyDerivation,
}

pub type Result<T> = std::result::Result<T, CryptoError>;
