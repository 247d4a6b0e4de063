//! Protocol constants and message types

/// Frame magic bytes.
pub const MAGIC: [u8; 4] = *b"MPJW";

/// Protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Upper bound on a single frame payload; converted rows are a few
/// hundred bytes, so anything near this limit is a corrupt stream.
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;

/// Message types carried in the frame preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    /// Source → helper: identifies the pushing source.
    SourceHello = 0x0001,
    /// Source → helper: one encrypted row.
    PushRow = 0x0002,
    /// Source → helper: end of the row stream.
    PushDone = 0x0003,
    /// Helper → source: all rows accepted.
    PushAck = 0x0004,
    /// Receiver → helper: request the converted table.
    PullRequest = 0x0011,
    /// Helper → receiver: number of rows about to be streamed.
    RowCount = 0x0012,
    /// Helper → receiver: one converted row with hint.
    PullRow = 0x0013,
    /// Either direction: fatal error, connection closes after this.
    Error = 0x00FF,
}

impl MsgType {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<MsgType> {
        match value {
            0x0001 => Some(MsgType::SourceHello),
            0x0002 => Some(MsgType::PushRow),
            0x0003 => Some(MsgType::PushDone),
            0x0004 => Some(MsgType::PushAck),
            0x0011 => Some(MsgType::PullRequest),
            0x0012 => Some(MsgType::RowCount),
            0x0013 => Some(MsgType::PullRow),
            0x00FF => Some(MsgType::Error),
            _ => None,
        }
    }
}
