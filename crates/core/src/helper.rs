//! Helper role: the convert stage.
//!
//! The helper pseudonymizes blinded identifiers under a per-session
//! conversion key, re-randomizes and symmetrically re-wraps every value,
//! and attaches one hint share per row. The per-source nonce shares form
//! an additive sharing of the pad key, so the receiver can peel the pad
//! off a row's key carrier only once it holds hints from *all* sources
//! for the same pseudonym. All converted rows land in one globally
//! shuffled output buffer.
//!
//! The helper never sees identifiers, values, or pseudonym plaintexts.

use std::collections::HashMap;

use crossbeam_channel::{bounded, Receiver};
use mppj_crypto::{oprf, pke, symmetric, OprfKey, PublicKeyTuple, Scalar};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::table::{EncRow, EncRowWithHint, EncTable, EncTableWithHint, SourceId};
use crate::worker_count;

/// One unit of conversion work: a pushed row and the table index of the
/// source it came from.
#[derive(Debug, Clone)]
pub struct ConvertTask {
    pub row: EncRow,
    pub table_index: usize,
}

/// Additive sharing of the pad key across sources.
#[derive(Debug)]
struct PadNonces {
    shares: Vec<Scalar>,
    pad_key: Scalar,
}

/// The helper for one session.
#[derive(Debug)]
pub struct Helper {
    sid: Vec<u8>,
    source_indices: HashMap<SourceId, usize>,
    conv_key: OprfKey,
    nonces: Option<PadNonces>,
    row_perm: Vec<usize>,
}

impl Helper {
    /// Sets up a helper: conversion key, one nonce share per source,
    /// and the output permutation over `sources.len() * n_rows_per_source`
    /// slots. Source positions in `sources` assign the table indices.
    pub fn new(sid: impl Into<Vec<u8>>, sources: &[SourceId], n_rows_per_source: usize) -> Helper {
        debug_assert!(sources.len() <= u8::MAX as usize + 1);
        let source_indices = sources
            .iter()
            .enumerate()
            .map(|(index, id)| (id.clone(), index))
            .collect();

        let mut rng = rand::thread_rng();
        let shares: Vec<Scalar> = (0..sources.len())
            .map(|_| Scalar::random(&mut rng))
            .collect();
        let pad_key = shares
            .iter()
            .fold(Scalar::zero(), |acc, share| acc.add(share));

        let mut row_perm: Vec<usize> = (0..sources.len() * n_rows_per_source).collect();
        row_perm.shuffle(&mut rng);

        Helper {
            sid: sid.into(),
            source_indices,
            conv_key: OprfKey::generate_from_rng(&mut rng),
            nonces: Some(PadNonces { shares, pad_key }),
            row_perm,
        }
    }

    /// Table index assigned to a source id, if configured.
    pub fn table_index(&self, source_id: &str) -> Option<usize> {
        self.source_indices.get(source_id).copied()
    }

    /// Configured source ids with their table indices.
    pub fn source_indices(&self) -> impl Iterator<Item = (&SourceId, usize)> {
        self.source_indices.iter().map(|(id, &index)| (id, index))
    }

    /// Total number of rows one conversion expects.
    pub fn expected_rows(&self) -> usize {
        self.row_perm.len()
    }

    /// Converts fully collected tables; a convenience wrapper around
    /// [`Helper::convert_stream`].
    pub fn convert(
        &self,
        rpk: &PublicKeyTuple,
        tables: &HashMap<SourceId, EncTable>,
    ) -> Result<EncTableWithHint> {
        let total: usize = tables.values().map(Vec::len).sum();
        let (task_tx, task_rx) = bounded::<ConvertTask>(total.max(1));
        for (source_id, table) in tables {
            let table_index = self
                .table_index(source_id)
                .ok_or_else(|| CoreError::UnknownSource(source_id.clone()))?;
            for row in table {
                let _ = task_tx.send(ConvertTask {
                    row: row.clone(),
                    table_index,
                });
            }
        }
        drop(task_tx);
        self.convert_stream(rpk, task_rx)
    }

    /// Consumes conversion tasks until the channel closes, writing each
    /// result into its permuted output slot. Finishes only when all
    /// expected rows arrived; both overshoot and undershoot are fatal.
    pub fn convert_stream(
        &self,
        rpk: &PublicKeyTuple,
        tasks: Receiver<ConvertTask>,
    ) -> Result<EncTableWithHint> {
        if self.nonces.is_none() {
            return Err(CoreError::NoncesNotInitialized);
        }

        let expected = self.row_perm.len();
        // Slot index and buffer share one lock; the permutation makes
        // every write land on a distinct slot.
        let output: Mutex<(usize, Vec<Option<EncRowWithHint>>)> =
            Mutex::new((0, vec![None; expected]));
        let first_err: Mutex<Option<CoreError>> = Mutex::new(None);

        let n = worker_count(0);
        debug!(workers = n, expected, "starting conversion");
        std::thread::scope(|scope| {
            for _ in 0..n {
                scope.spawn(|| {
                    for task in tasks.iter() {
                        if first_err.lock().is_some() {
                            continue; // drain so producers never stall
                        }
                        match self.convert_row(rpk, &task.row, task.table_index) {
                            Ok(converted) => {
                                let mut slot = output.lock();
                                if slot.0 >= expected {
                                    let mut guard = first_err.lock();
                                    if guard.is_none() {
                                        *guard = Some(CoreError::UnexpectedRowCount { expected });
                                    }
                                    continue;
                                }
                                let position = self.row_perm[slot.0];
                                slot.1[position] = Some(converted);
                                slot.0 += 1;
                            }
                            Err(err) => {
                                let mut guard = first_err.lock();
                                if guard.is_none() {
                                    *guard = Some(err);
                                }
                            }
                        }
                    }
                });
            }
        });

        if let Some(err) = first_err.into_inner() {
            return Err(err);
        }

        let (written, slots) = output.into_inner();
        if written != expected {
            return Err(CoreError::UnexpectedRowCount { expected });
        }
        Ok(slots.into_iter().flatten().collect())
    }

    /// Converts one row for the source at `table_index`.
    pub fn convert_row(
        &self,
        rpk: &PublicKeyTuple,
        row: &EncRow,
        table_index: usize,
    ) -> Result<EncRowWithHint> {
        let cnyme = oprf::eval(&self.conv_key, &rpk.bpk, &row.cuid);
        let (cval, cval_key, chint) = self.blind_and_hint(rpk, row, table_index)?;
        Ok(EncRowWithHint {
            cnyme,
            cval,
            cval_key,
            chint,
        })
    }

    /// Builds the symmetric value blob, the blinded key carrier, and the
    /// hint share for one row.
    fn blind_and_hint(
        &self,
        rpk: &PublicKeyTuple,
        row: &EncRow,
        table_index: usize,
    ) -> Result<(Vec<u8>, pke::Ciphertext, pke::Ciphertext)> {
        let nonces = self.nonces.as_ref().ok_or(CoreError::NoncesNotInitialized)?;
        if table_index >= nonces.shares.len() {
            return Err(CoreError::UnknownSource(format!("index {table_index}")));
        }

        let (pad_point, key) =
            symmetric::random_key_from_point(&mut rand::thread_rng(), &self.sid)
                .map_err(CoreError::ConvertFailed)?;

        let rerandomized = pke::rerand_vector(&rpk.epk, &row.cval);
        let serialized =
            pke::serialize_vector(&rerandomized).map_err(CoreError::ConvertFailed)?;
        // Table index prefix lets the receiver restore column order.
        let mut blob = Vec::with_capacity(1 + serialized.len());
        blob.push(table_index as u8);
        blob.extend_from_slice(&serialized);
        let cval = symmetric::encrypt(&key, &blob);

        // Key carrier: H(uid)^pad_key * pad_point, recoverable only with
        // all hint shares of the bucket.
        let pad_key = OprfKey::from_scalar(nonces.pad_key);
        let cval_key = oprf::eval(&pad_key, &rpk.bpk, &row.cuid).mul_c1(&pad_point);

        let share = OprfKey::from_scalar(nonces.shares[table_index]);
        let chint = oprf::eval(&share, &rpk.bpk, &row.cuid);

        Ok((cval, cval_key, chint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DataSource;
    use mppj_crypto::pke::keys_from_seed;
    use mppj_crypto::Point;

    const SID: &[u8] = b"convert-test-session";

    fn sources() -> Vec<SourceId> {
        vec!["ds1".to_string(), "ds2".to_string()]
    }

    #[test]
    fn convert_produces_one_output_per_input() {
        let (_, rpk) = keys_from_seed(SID);
        let ds = DataSource::new(SID, rpk);
        let helper = Helper::new(SID, &sources(), 3);

        let mut tables = HashMap::new();
        for id in sources() {
            let mut table = crate::table::PlainTable::new();
            for i in 0..3 {
                table.insert(format!("{id}-uid-{i}"), format!("val-{i}"));
            }
            tables.insert(id, ds.prepare(&table).unwrap());
        }

        let converted = helper.convert(&rpk, &tables).unwrap();
        assert_eq!(converted.len(), 6);
    }

    #[test]
    fn convert_rejects_row_count_mismatch() {
        let (_, rpk) = keys_from_seed(SID);
        let ds = DataSource::new(SID, rpk);
        // Expecting 2 rows per source but each table holds one.
        let helper = Helper::new(SID, &sources(), 2);

        let mut tables = HashMap::new();
        for id in sources() {
            let mut table = crate::table::PlainTable::new();
            table.insert(format!("{id}-uid"), "v");
            tables.insert(id, ds.prepare(&table).unwrap());
        }

        assert!(matches!(
            helper.convert(&rpk, &tables),
            Err(CoreError::UnexpectedRowCount { .. })
        ));
    }

    #[test]
    fn convert_rejects_unknown_sources() {
        let (_, rpk) = keys_from_seed(SID);
        let ds = DataSource::new(SID, rpk);
        let helper = Helper::new(SID, &sources(), 1);

        let mut table = crate::table::PlainTable::new();
        table.insert("uid", "val");
        let mut tables = HashMap::new();
        tables.insert("stranger".to_string(), ds.prepare(&table).unwrap());

        assert!(matches!(
            helper.convert(&rpk, &tables),
            Err(CoreError::UnknownSource(_))
        ));
    }

    #[test]
    fn pseudonyms_match_across_sources_for_equal_uids() {
        let (rsk, rpk) = keys_from_seed(SID);
        let ds = DataSource::new(SID, rpk);
        let helper = Helper::new(SID, &sources(), 1);

        let row_a = ds.process_row("shared-uid", "va").unwrap();
        let row_b = ds.process_row("shared-uid", "vb").unwrap();
        let conv_a = helper.convert_row(&rpk, &row_a, 0).unwrap();
        let conv_b = helper.convert_row(&rpk, &row_b, 1).unwrap();

        let nyme_a = oprf::unblind(&rsk.bsk, &conv_a.cnyme);
        let nyme_b = oprf::unblind(&rsk.bsk, &conv_b.cnyme);
        assert_eq!(nyme_a, nyme_b);

        let other = ds.process_row("other-uid", "vc").unwrap();
        let conv_c = helper.convert_row(&rpk, &other, 0).unwrap();
        assert_ne!(nyme_a, oprf::unblind(&rsk.bsk, &conv_c.cnyme));
    }

    #[test]
    fn hint_combination_recovers_the_pad_point() {
        // For a full bucket, the product of unblinded hints equals the
        // pad evaluation, and peeling it off each key carrier leaves a
        // point whose derived key opens the value blob.
        let (rsk, rpk) = keys_from_seed(SID);
        let ds = DataSource::new(SID, rpk);
        let source_ids = sources();
        let helper = Helper::new(SID, &source_ids, 1);

        let rows = [
            helper
                .convert_row(&rpk, &ds.process_row("uid", "left").unwrap(), 0)
                .unwrap(),
            helper
                .convert_row(&rpk, &ds.process_row("uid", "right").unwrap(), 1)
                .unwrap(),
        ];

        let mut mask = Point::identity();
        for row in &rows {
            mask = mask.mul(oprf::unblind(&rsk.bsk, &row.chint).as_point());
        }
        let inv_mask = mask.invert();

        for (row, expected) in rows.iter().zip(["left", "right"]) {
            let carrier = oprf::unblind(&rsk.bsk, &row.cval_key);
            let pad_point = carrier.as_point().mul(&inv_mask);
            let key = symmetric::key_from_point(&pad_point, SID).unwrap();
            let blob = symmetric::decrypt(&key, &row.cval);
            let chunks = pke::deserialize_vector(&blob[1..]).unwrap();
            let value = pke::decrypt_vector(&rsk.esk, &chunks).unwrap();
            assert_eq!(value, expected.as_bytes());
        }
    }
}
