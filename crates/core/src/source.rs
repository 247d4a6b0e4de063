//! Data source role: the prepare stage.
//!
//! A source blinds each user-id for the OPRF and encrypts each value
//! towards the receiver, emitting rows in a random order that is
//! independent of the input iteration order. The helper reshuffles
//! globally, so the source-side shuffle is defense in depth.

use crossbeam_channel::{bounded, Receiver};
use mppj_crypto::{oprf, pke, PublicKeyTuple, PAYLOAD_SIZE};
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::table::{EncRow, EncTable, PlainTable};
use crate::worker_count;

/// Longest value a source accepts, bounded by the single-chunk wire
/// layout.
pub const MAX_VALUE_LEN: usize = PAYLOAD_SIZE;

/// A data source bound to one session and the receiver's public keys.
#[derive(Debug, Clone)]
pub struct DataSource {
    sid: Vec<u8>,
    rpk: PublicKeyTuple,
}

impl DataSource {
    pub fn new(sid: impl Into<Vec<u8>>, rpk: PublicKeyTuple) -> Self {
        Self {
            sid: sid.into(),
            rpk,
        }
    }

    /// Prepares a whole table, collecting the stream and checking the
    /// row count.
    pub fn prepare(&self, table: &PlainTable) -> Result<EncTable> {
        let rows = self.prepare_stream(table, 0)?;
        let mut prepared = Vec::with_capacity(table.len());
        for row in rows {
            prepared.push(row?);
        }
        if prepared.len() != table.len() {
            return Err(CoreError::RowCountMismatch {
                expected: table.len(),
                got: prepared.len(),
            });
        }
        Ok(prepared)
    }

    /// Prepares a table row by row on a worker pool of `workers`
    /// threads (`0` = available parallelism), yielding rows as they
    /// finish. The input order is destroyed by a CSPRNG permutation
    /// before dispatch; worker interleaving randomizes it further.
    pub fn prepare_stream(
        &self,
        table: &PlainTable,
        workers: usize,
    ) -> Result<Receiver<Result<EncRow>>> {
        let mut rows: Vec<(String, String)> = Vec::with_capacity(table.len());
        for (uid, val) in table.iter() {
            if uid.is_empty() {
                return Err(CoreError::EmptyUid);
            }
            if val.len() > MAX_VALUE_LEN {
                return Err(CoreError::ValueTooLong {
                    len: val.len(),
                    max: MAX_VALUE_LEN,
                });
            }
            rows.push((uid.clone(), val.clone()));
        }
        rows.shuffle(&mut rand::thread_rng());

        let capacity = rows.len().max(1);
        let (task_tx, task_rx) = bounded::<(String, String)>(capacity);
        let (out_tx, out_rx) = bounded::<Result<EncRow>>(capacity);
        for row in rows {
            // Capacity covers the whole table, so this never blocks.
            let _ = task_tx.send(row);
        }
        drop(task_tx);

        let n = worker_count(workers);
        debug!(workers = n, "dispatching prepare tasks");
        for _ in 0..n {
            let source = self.clone();
            let task_rx = task_rx.clone();
            let out_tx = out_tx.clone();
            std::thread::spawn(move || {
                for (uid, val) in task_rx.iter() {
                    if out_tx.send(source.process_row(&uid, &val)).is_err() {
                        // Receiver side hung up; nothing left to report.
                        break;
                    }
                }
            });
        }

        Ok(out_rx)
    }

    /// Blinds one uid and encrypts one value.
    pub fn process_row(&self, uid: &str, val: &str) -> Result<EncRow> {
        let cuid = oprf::blind(&self.rpk.bpk, uid.as_bytes(), &self.sid)
            .map_err(CoreError::PrepareFailed)?;
        let cval = pke::encrypt_vector(&self.rpk.epk, val.as_bytes())
            .map_err(CoreError::PrepareFailed)?;
        Ok(EncRow { cuid, cval })
    }
}
