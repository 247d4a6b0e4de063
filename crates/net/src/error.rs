//! Transport error types

use mppj_core::CoreError;
use mppj_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("missing source id")]
    Unauthenticated,

    #[error("unexpected source id: {0}")]
    UnknownSource(String),

    #[error("already connected: {0}")]
    AlreadyConnected(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("expected {expected}, got {got}")]
    UnexpectedMessage { expected: &'static str, got: String },

    #[error("expected {expected} rows, got {got}")]
    RowCountMismatch { expected: usize, got: usize },

    #[error("internal: {0}")]
    Internal(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;
