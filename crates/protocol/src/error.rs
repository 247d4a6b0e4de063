//! Protocol error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid magic bytes")]
    InvalidMagic,

    #[error("version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u16, got: u16 },

    #[error("unknown message type: 0x{0:04X}")]
    UnknownMessageType(u16),

    #[error("payload CRC mismatch: expected 0x{expected:08X}, got 0x{got:08X}")]
    PayloadCrcMismatch { expected: u32, got: u32 },

    #[error("payload too large: {len} > {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("invalid payload length for message type")]
    InvalidPayloadLength,

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
