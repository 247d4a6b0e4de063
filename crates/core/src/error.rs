//! Role error types

use mppj_crypto::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("empty user id")]
    EmptyUid,

    #[error("value too long: {len} > {max}")]
    ValueTooLong { len: usize, max: usize },

    #[error("prepare failed: {0}")]
    PrepareFailed(#[source] CryptoError),

    #[error("prepared {got} rows, expected {expected}")]
    RowCountMismatch { expected: usize, got: usize },

    #[error("nonce shares not initialized")]
    NoncesNotInitialized,

    #[error("received more rows than the expected {expected}")]
    UnexpectedRowCount { expected: usize },

    #[error("row conversion failed: {0}")]
    ConvertFailed(#[source] CryptoError),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("unknown source id: {0}")]
    UnknownSource(String),

    #[error("row serialization failed: {0}")]
    RowSerialization(#[source] CryptoError),

    #[error("row has no value ciphertext")]
    EmptyValue,

    #[error("row frame too short: {got} < {min}")]
    RowTooShort { got: usize, min: usize },

    #[error("row frame length {got} is not a whole number of ciphertexts")]
    MisalignedRow { got: usize },
}

pub type Result<T> = std::result::Result<T, CoreError>;
