//! Helper service: rendezvous between sources and receiver.
//!
//! Conversion runs on its own worker pool fed by every source
//! connection; the task channel closes once the last configured source
//! finished pushing, and the single receiver connection blocks until
//! the converted table is ready. First connection per source id wins;
//! repeats are refused.

use std::collections::{HashMap, HashSet};
use std::net::{TcpListener, TcpStream};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use mppj_core::{ConvertTask, EncRow, EncTableWithHint, Helper, SourceId};
use mppj_crypto::PublicKeyTuple;
use mppj_protocol::{ErrorMsg, Frame, MsgType, RowCount, SourceHello};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{NetError, Result};
use crate::stats::{CountingStream, NetStats};

type ConversionResult = mppj_core::Result<EncTableWithHint>;

struct ServerState {
    indices: HashMap<SourceId, usize>,
    connected: Mutex<HashSet<SourceId>>,
    remaining: Mutex<usize>,
    task_tx: Mutex<Option<Sender<ConvertTask>>>,
    table_rx: Mutex<Option<Receiver<ConversionResult>>>,
    done_tx: Sender<Result<usize>>,
    stats: NetStats,
}

/// Runs one helper session on a bound listener: accepts every source
/// push, converts, serves the single pull, then returns. Fatal crypto
/// or protocol errors abort the session.
pub fn run_helper(
    helper: Helper,
    rpk: PublicKeyTuple,
    listener: TcpListener,
    stats: NetStats,
) -> Result<()> {
    let (task_tx, task_rx) = unbounded::<ConvertTask>();
    let (table_tx, table_rx) = bounded::<ConversionResult>(1);
    let (done_tx, done_rx) = bounded::<Result<usize>>(1);

    let indices: HashMap<SourceId, usize> = helper
        .source_indices()
        .map(|(id, index)| (id.clone(), index))
        .collect();
    info!(
        sources = indices.len(),
        rows = helper.expected_rows(),
        "waiting for sources"
    );

    let converter = std::thread::spawn(move || {
        let result = helper.convert_stream(&rpk, task_rx);
        let _ = table_tx.send(result);
    });

    let remaining = indices.len();
    let state = Arc::new(ServerState {
        indices,
        connected: Mutex::new(HashSet::new()),
        remaining: Mutex::new(remaining),
        task_tx: Mutex::new(Some(task_tx)),
        table_rx: Mutex::new(Some(table_rx)),
        done_tx,
        stats,
    });

    {
        let state = Arc::clone(&state);
        std::thread::spawn(move || {
            for conn in listener.incoming() {
                match conn {
                    Ok(stream) => {
                        let state = Arc::clone(&state);
                        std::thread::spawn(move || {
                            if let Err(err) = handle_connection(&state, stream) {
                                error!(%err, "connection failed");
                            }
                        });
                    }
                    Err(err) => {
                        warn!(%err, "accept failed");
                    }
                }
            }
        });
    }

    let result = done_rx
        .recv()
        .map_err(|_| NetError::Internal("helper service stopped early".to_string()))?;
    let _ = converter.join();
    result.map(|rows| {
        info!(rows, "session complete");
    })
}

fn handle_connection(state: &ServerState, stream: TcpStream) -> Result<()> {
    let mut stream = CountingStream::new(stream, state.stats.clone());
    let frame = Frame::read_from(&mut stream)?;
    match frame.msg_type {
        MsgType::SourceHello => {
            let hello = SourceHello::from_payload(&frame.payload)?;
            handle_push(state, stream, hello)
        }
        MsgType::PullRequest => handle_pull(state, stream),
        other => {
            let err = NetError::UnexpectedMessage {
                expected: "SourceHello or PullRequest",
                got: format!("{other:?}"),
            };
            refuse(&mut stream, &err);
            Err(err)
        }
    }
}

/// Receives one source's row stream into the conversion queue.
fn handle_push(
    state: &ServerState,
    mut stream: CountingStream<TcpStream>,
    hello: SourceHello,
) -> Result<()> {
    let source_id = hello.source_id;
    if source_id.is_empty() {
        return reject_push(&mut stream, NetError::Unauthenticated);
    }
    let Some(&table_index) = state.indices.get(&source_id) else {
        return reject_push(&mut stream, NetError::UnknownSource(source_id));
    };
    if !state.connected.lock().insert(source_id.clone()) {
        return reject_push(&mut stream, NetError::AlreadyConnected(source_id));
    }

    let Some(task_tx) = state.task_tx.lock().clone() else {
        return reject_push(
            &mut stream,
            NetError::Internal("push after conversion finished".to_string()),
        );
    };

    info!(%source_id, table_index, "receiving rows");
    let mut count = 0usize;
    loop {
        let frame = Frame::read_from(&mut stream)?;
        match frame.msg_type {
            MsgType::PushRow => {
                let row = EncRow::from_bytes(&frame.payload)?;
                if task_tx
                    .send(ConvertTask { row, table_index })
                    .is_err()
                {
                    let err = NetError::Internal("conversion stopped".to_string());
                    refuse(&mut stream, &err);
                    return Err(err);
                }
                count += 1;
            }
            MsgType::PushDone => break,
            MsgType::Error => {
                return Err(NetError::Remote(
                    ErrorMsg::from_payload(&frame.payload)?.message,
                ))
            }
            other => {
                let err = NetError::UnexpectedMessage {
                    expected: "PushRow or PushDone",
                    got: format!("{other:?}"),
                };
                refuse(&mut stream, &err);
                return Err(err);
            }
        }
    }
    drop(task_tx);
    info!(%source_id, count, "rows received");

    Frame::empty(MsgType::PushAck).write_to(&mut stream)?;

    // Close the conversion queue once every configured source finished.
    let mut remaining = state.remaining.lock();
    *remaining -= 1;
    if *remaining == 0 {
        state.task_tx.lock().take();
    }
    Ok(())
}

/// Serves the converted table to the single receiver connection.
fn handle_pull(state: &ServerState, mut stream: CountingStream<TcpStream>) -> Result<()> {
    let Some(table_rx) = state.table_rx.lock().take() else {
        let err = NetError::AlreadyConnected("receiver".to_string());
        refuse(&mut stream, &err);
        return Err(err);
    };

    // Blocks until conversion finishes.
    let outcome = (|| -> Result<usize> {
        let table = table_rx
            .recv()
            .map_err(|_| NetError::Internal("converter stopped".to_string()))??;

        info!(rows = table.len(), "sending converted table");
        RowCount::new(table.len() as u64)
            .into_frame()
            .write_to(&mut stream)?;
        for row in &table {
            Frame::new(MsgType::PullRow, row.to_bytes()?).write_to(&mut stream)?;
        }
        Ok(table.len())
    })();

    if let Err(err) = &outcome {
        refuse(&mut stream, err);
    }
    let _ = state.done_tx.send(outcome);
    Ok(())
}

/// Best-effort error frame before dropping the connection.
fn refuse<S: std::io::Write>(stream: &mut S, err: &NetError) {
    let _ = ErrorMsg::new(err.to_string()).into_frame().write_to(stream);
}

/// Refuses a push: sends the error frame, then drains whatever the
/// source keeps streaming so the frame is delivered instead of being
/// torn down with a connection reset.
fn reject_push(stream: &mut CountingStream<TcpStream>, err: NetError) -> Result<()> {
    use std::io::Read;

    refuse(stream, &err);
    let _ = stream.get_ref().shutdown(std::net::Shutdown::Write);
    let mut sink = [0u8; 4096];
    loop {
        match stream.read(&mut sink) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
    Err(err)
}
