//! Wire format for the private join protocol.
//!
//! Framing and message payload types for the two streaming calls:
//! sources push encrypted rows to the helper, the receiver pulls
//! converted rows back. The transport below is any ordered reliable
//! byte stream.

mod constants;
mod error;
mod frame;
mod messages;

pub use constants::{MsgType, MAGIC, MAX_PAYLOAD_LEN, PROTOCOL_VERSION};
pub use error::{ProtocolError, Result};
pub use frame::Frame;
pub use messages::{ErrorMsg, RowCount, SourceHello};
