//! Frame encoding/decoding
//!
//! Preamble: magic(4) + version(2) + msg_type(2) + payload_len(4) +
//! payload_crc(4), little-endian, followed by the payload. The CRC
//! covers the payload only.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::constants::{MsgType, MAGIC, MAX_PAYLOAD_LEN, PROTOCOL_VERSION};
use crate::error::{ProtocolError, Result};

/// Preamble size in bytes.
const PREAMBLE_SIZE: usize = 16;

/// A complete wire frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(msg_type: MsgType, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    /// A frame with an empty payload (control messages).
    pub fn empty(msg_type: MsgType) -> Self {
        Self::new(msg_type, Vec::new())
    }

    /// Encodes the frame to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let crc = crc32fast::hash(&self.payload);
        let mut buf = Vec::with_capacity(PREAMBLE_SIZE + self.payload.len());
        buf.extend_from_slice(&MAGIC);
        buf.write_u16::<LittleEndian>(PROTOCOL_VERSION).unwrap();
        buf.write_u16::<LittleEndian>(self.msg_type.to_u16()).unwrap();
        buf.write_u32::<LittleEndian>(self.payload.len() as u32)
            .unwrap();
        buf.write_u32::<LittleEndian>(crc).unwrap();
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Writes the encoded frame to a stream.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode())?;
        Ok(())
    }

    /// Reads one frame from a stream, validating magic, version, length
    /// bound, and payload CRC.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Frame> {
        let mut preamble = [0u8; PREAMBLE_SIZE];
        reader.read_exact(&mut preamble)?;
        let mut cursor = &preamble[..];

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        let version = cursor.read_u16::<LittleEndian>()?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: version,
            });
        }

        let msg_type_raw = cursor.read_u16::<LittleEndian>()?;
        let msg_type = MsgType::from_u16(msg_type_raw)
            .ok_or(ProtocolError::UnknownMessageType(msg_type_raw))?;

        let payload_len = cursor.read_u32::<LittleEndian>()? as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge {
                len: payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }
        let expected_crc = cursor.read_u32::<LittleEndian>()?;

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload)?;

        let crc = crc32fast::hash(&payload);
        if crc != expected_crc {
            return Err(ProtocolError::PayloadCrcMismatch {
                expected: expected_crc,
                got: crc,
            });
        }

        Ok(Frame { msg_type, payload })
    }
}
