//! Typed message payloads
//!
//! Row payloads (`PushRow`, `PullRow`) are carried as raw bytes in their
//! fixed layouts; the payloads here are the small control messages.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::constants::MsgType;
use crate::error::{ProtocolError, Result};
use crate::frame::Frame;

/// Source → helper stream opener carrying the source identifier, the
/// authentication metadata of the push call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHello {
    pub source_id: String,
}

impl SourceHello {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
        }
    }

    pub fn into_frame(self) -> Frame {
        let bytes = self.source_id.into_bytes();
        let mut payload = Vec::with_capacity(2 + bytes.len());
        payload.write_u16::<LittleEndian>(bytes.len() as u16).unwrap();
        payload.extend_from_slice(&bytes);
        Frame::new(MsgType::SourceHello, payload)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let mut cursor = payload;
        let len = cursor.read_u16::<LittleEndian>()? as usize;
        if cursor.len() != len {
            return Err(ProtocolError::InvalidPayloadLength);
        }
        let mut bytes = vec![0u8; len];
        cursor.read_exact(&mut bytes)?;
        let source_id = String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(Self { source_id })
    }
}

/// Helper → receiver stream opener: the number of converted rows that
/// follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCount {
    pub num_rows: u64,
}

impl RowCount {
    pub fn new(num_rows: u64) -> Self {
        Self { num_rows }
    }

    pub fn into_frame(self) -> Frame {
        let mut payload = Vec::with_capacity(8);
        payload.write_u64::<LittleEndian>(self.num_rows).unwrap();
        Frame::new(MsgType::RowCount, payload)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() != 8 {
            return Err(ProtocolError::InvalidPayloadLength);
        }
        let mut cursor = payload;
        let num_rows = cursor.read_u64::<LittleEndian>()?;
        Ok(Self { num_rows })
    }
}

/// Fatal error notification; the connection closes after this frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub message: String,
}

impl ErrorMsg {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn into_frame(self) -> Frame {
        Frame::new(MsgType::Error, self.message.into_bytes())
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let message =
            String::from_utf8(payload.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(Self { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_hello_roundtrip() {
        let hello = SourceHello::new("ds1");
        let frame = hello.clone().into_frame();
        assert_eq!(frame.msg_type, MsgType::SourceHello);
        assert_eq!(SourceHello::from_payload(&frame.payload).unwrap(), hello);
    }

    #[test]
    fn source_hello_rejects_truncated_payload() {
        let frame = SourceHello::new("a-longer-source-id").into_frame();
        assert!(matches!(
            SourceHello::from_payload(&frame.payload[..frame.payload.len() - 1]),
            Err(ProtocolError::InvalidPayloadLength)
        ));
    }

    #[test]
    fn row_count_roundtrip() {
        let frame = RowCount::new(3000).into_frame();
        assert_eq!(
            RowCount::from_payload(&frame.payload).unwrap().num_rows,
            3000
        );
    }

    #[test]
    fn error_msg_roundtrip() {
        let frame = ErrorMsg::new("unexpected source id").into_frame();
        assert_eq!(
            ErrorMsg::from_payload(&frame.payload).unwrap().message,
            "unexpected source id"
        );
    }
}
