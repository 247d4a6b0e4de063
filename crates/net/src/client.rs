//! Client sides of the two streaming calls.

use std::net::TcpStream;

use crossbeam_channel::{Receiver, Sender};
use mppj_core::{EncRow, EncRowWithHint};
use mppj_protocol::{ErrorMsg, Frame, MsgType, RowCount, SourceHello};
use tracing::{debug, info};

use crate::error::{NetError, Result};
use crate::stats::{CountingStream, NetStats};

/// Streams prepared rows to the helper: hello frame with the source id,
/// one `PushRow` per row, `PushDone`, then the helper's ack. Returns the
/// number of rows pushed.
pub fn push_rows(
    addr: &str,
    source_id: &str,
    rows: Receiver<mppj_core::Result<EncRow>>,
    stats: &NetStats,
) -> Result<usize> {
    let stream = TcpStream::connect(addr)?;
    let mut stream = CountingStream::new(stream, stats.clone());
    debug!(addr, source_id, "pushing rows");

    SourceHello::new(source_id).into_frame().write_to(&mut stream)?;

    let mut count = 0usize;
    for row in rows.iter() {
        let row = row?;
        let frame = Frame::new(MsgType::PushRow, row.to_bytes()?);
        if let Err(err) = frame.write_to(&mut stream) {
            // The helper may have rejected us and closed; surface its
            // error frame if one is pending.
            return Err(pending_remote_error(&mut stream).unwrap_or(NetError::Protocol(err)));
        }
        count += 1;
    }

    Frame::empty(MsgType::PushDone).write_to(&mut stream)?;
    let reply = Frame::read_from(&mut stream)?;
    match reply.msg_type {
        MsgType::PushAck => {
            info!(count, source_id = %source_id, "rows pushed");
            Ok(count)
        }
        MsgType::Error => Err(NetError::Remote(
            ErrorMsg::from_payload(&reply.payload)?.message,
        )),
        other => Err(NetError::UnexpectedMessage {
            expected: "PushAck",
            got: format!("{other:?}"),
        }),
    }
}

/// Pulls the converted table from the helper, forwarding rows into
/// `out` as they arrive. Returns the row count announced by the helper;
/// fewer delivered rows is an error.
pub fn pull_rows(addr: &str, out: Sender<EncRowWithHint>, stats: &NetStats) -> Result<usize> {
    let stream = TcpStream::connect(addr)?;
    let mut stream = CountingStream::new(stream, stats.clone());
    debug!(addr, "pulling rows");

    Frame::empty(MsgType::PullRequest).write_to(&mut stream)?;

    let header = Frame::read_from(&mut stream)?;
    let num_rows = match header.msg_type {
        MsgType::RowCount => RowCount::from_payload(&header.payload)?.num_rows as usize,
        MsgType::Error => {
            return Err(NetError::Remote(
                ErrorMsg::from_payload(&header.payload)?.message,
            ))
        }
        other => {
            return Err(NetError::UnexpectedMessage {
                expected: "RowCount",
                got: format!("{other:?}"),
            })
        }
    };
    info!(num_rows, "expecting rows from helper");

    for received in 0..num_rows {
        let frame = match Frame::read_from(&mut stream) {
            Ok(frame) => frame,
            Err(err) => {
                if matches!(&err, mppj_protocol::ProtocolError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof)
                {
                    return Err(NetError::RowCountMismatch {
                        expected: num_rows,
                        got: received,
                    });
                }
                return Err(err.into());
            }
        };
        match frame.msg_type {
            MsgType::PullRow => {
                let row = EncRowWithHint::from_bytes(&frame.payload)?;
                if out.send(row).is_err() {
                    return Err(NetError::Internal("row consumer hung up".to_string()));
                }
            }
            MsgType::Error => {
                return Err(NetError::Remote(
                    ErrorMsg::from_payload(&frame.payload)?.message,
                ))
            }
            other => {
                return Err(NetError::UnexpectedMessage {
                    expected: "PullRow",
                    got: format!("{other:?}"),
                })
            }
        }
    }

    info!(num_rows, "all rows received");
    Ok(num_rows)
}

/// Tries to read a pending error frame after a failed write.
fn pending_remote_error<S: std::io::Read>(stream: &mut S) -> Option<NetError> {
    let frame = Frame::read_from(stream).ok()?;
    if frame.msg_type == MsgType::Error {
        let msg = ErrorMsg::from_payload(&frame.payload).ok()?;
        Some(NetError::Remote(msg.message))
    } else {
        None
    }
}
