//! Receiver role: the join stage.
//!
//! The receiver unblinds each row's pseudonym and buckets rows by it;
//! buckets holding a row from every source are exactly the intersection.
//! Combining a full bucket's hints yields the pad evaluation, whose
//! inverse peels the pad off each row's key carrier; the leftover point
//! keys the symmetric blob, which in turn wraps the re-randomized value
//! ciphertexts.

use std::collections::HashMap;

use crossbeam_channel::{bounded, Receiver as ChannelReceiver};
use mppj_crypto::{oprf, pke, symmetric, Point, PublicKeyTuple, SecretKeyTuple};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::table::{EncRowWithHint, EncTableWithHint, JoinTable, SourceId};
use crate::worker_count;

/// The receiver for one session.
pub struct Receiver {
    sid: Vec<u8>,
    source_ids: Vec<SourceId>,
    sk: SecretKeyTuple,
    pk: PublicKeyTuple,
}

impl Receiver {
    /// Creates a receiver with freshly generated key tuples.
    pub fn new(sid: impl Into<Vec<u8>>, source_ids: Vec<SourceId>) -> Receiver {
        let (bsk, bpk) = pke::keygen();
        let (esk, epk) = pke::keygen();
        Self::with_keys(
            sid,
            source_ids,
            SecretKeyTuple { bsk, esk },
            PublicKeyTuple { bpk, epk },
        )
    }

    /// Creates a receiver around externally distributed keys.
    pub fn with_keys(
        sid: impl Into<Vec<u8>>,
        source_ids: Vec<SourceId>,
        sk: SecretKeyTuple,
        pk: PublicKeyTuple,
    ) -> Receiver {
        Receiver {
            sid: sid.into(),
            source_ids,
            sk,
            pk,
        }
    }

    /// The public material sources and helper encrypt towards.
    pub fn public_keys(&self) -> &PublicKeyTuple {
        &self.pk
    }

    /// Joins a fully collected converted table; a convenience wrapper
    /// around [`Receiver::join_stream`].
    pub fn join(&self, table: EncTableWithHint) -> Result<JoinTable> {
        let (row_tx, row_rx) = bounded(table.len().max(1));
        for row in table {
            let _ = row_tx.send(row);
        }
        drop(row_tx);
        self.join_stream(row_rx)
    }

    /// Consumes converted rows until the channel closes, then filters
    /// full buckets and decrypts them. Underfull buckets are uids absent
    /// from at least one source and are dropped silently.
    pub fn join_stream(&self, rows: ChannelReceiver<EncRowWithHint>) -> Result<JoinTable> {
        let groups = self.bucket_by_pseudonym(rows)?;
        debug!(buckets = groups.len(), "bucketing complete");

        let arity = self.source_ids.len();
        let (task_tx, task_rx) = bounded::<Vec<EncRowWithHint>>(groups.len().max(1));
        for (_, group) in groups {
            if group.len() == arity {
                let _ = task_tx.send(group);
            }
        }
        drop(task_tx);

        let join = Mutex::new(JoinTable::new(self.source_ids.clone()));
        let first_err: Mutex<Option<CoreError>> = Mutex::new(None);
        std::thread::scope(|scope| {
            for _ in 0..worker_count(0) {
                scope.spawn(|| {
                    for group in task_rx.iter() {
                        if first_err.lock().is_some() {
                            continue;
                        }
                        let result = self
                            .decrypt_group(&group)
                            .and_then(|values| join.lock().insert(&values));
                        if let Err(err) = result {
                            let mut guard = first_err.lock();
                            if guard.is_none() {
                                *guard = Some(err);
                            }
                        }
                    }
                });
            }
        });

        if let Some(err) = first_err.into_inner() {
            return Err(err);
        }
        Ok(join.into_inner())
    }

    /// Stage A: unblind pseudonyms on a worker pool and bucket whole
    /// rows under their pseudonym bytes.
    fn bucket_by_pseudonym(
        &self,
        rows: ChannelReceiver<EncRowWithHint>,
    ) -> Result<HashMap<Vec<u8>, Vec<EncRowWithHint>>> {
        let groups: Mutex<HashMap<Vec<u8>, Vec<EncRowWithHint>>> = Mutex::new(HashMap::new());
        let first_err: Mutex<Option<CoreError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for _ in 0..worker_count(0) {
                scope.spawn(|| {
                    for row in rows.iter() {
                        if first_err.lock().is_some() {
                            continue;
                        }
                        match oprf::unblind(&self.sk.bsk, &row.cnyme).payload() {
                            Ok(pseudonym) => {
                                groups.lock().entry(pseudonym).or_default().push(row);
                            }
                            Err(err) => {
                                let mut guard = first_err.lock();
                                if guard.is_none() {
                                    *guard = Some(CoreError::CorruptRow(err.to_string()));
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
        Ok(groups.into_inner())
    }

    /// Stage C: recovers the per-source values of one full bucket.
    fn decrypt_group(&self, group: &[EncRowWithHint]) -> Result<HashMap<SourceId, String>> {
        // Combine all hints into the pad evaluation and invert it once.
        let mut mask = Point::identity();
        for row in group {
            mask = mask.mul(oprf::unblind(&self.sk.bsk, &row.chint).as_point());
        }
        let inv_mask = mask.invert();

        let mut values = HashMap::with_capacity(group.len());
        for row in group {
            let carrier = oprf::unblind(&self.sk.bsk, &row.cval_key);
            let pad_point = carrier.as_point().mul(&inv_mask);
            let key = symmetric::key_from_point(&pad_point, &self.sid)
                .map_err(|e| CoreError::CorruptRow(e.to_string()))?;

            let blob = symmetric::decrypt(&key, &row.cval);
            if blob.is_empty() {
                return Err(CoreError::CorruptRow("empty value blob".to_string()));
            }
            let (index_byte, enc_value) = blob.split_at(1);
            let table_index = index_byte[0] as usize;
            let source_id = self
                .source_ids
                .get(table_index)
                .ok_or_else(|| {
                    CoreError::CorruptRow(format!("invalid table index {table_index}"))
                })?
                .clone();

            let chunks = pke::deserialize_vector(enc_value)
                .map_err(|e| CoreError::CorruptRow(e.to_string()))?;
            let plain = pke::decrypt_vector(&self.sk.esk, &chunks)
                .map_err(|e| CoreError::CorruptRow(e.to_string()))?;
            let value = String::from_utf8(plain)
                .map_err(|_| CoreError::CorruptRow("value is not UTF-8".to_string()))?;

            values.insert(source_id, value);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::Helper;
    use crate::source::DataSource;
    use crate::table::PlainTable;
    use mppj_crypto::pke::keys_from_seed;

    const SID: &[u8] = b"join-test-session";

    fn run_pipeline(
        tables: &HashMap<SourceId, PlainTable>,
        source_ids: &[SourceId],
        n_rows: usize,
    ) -> JoinTable {
        let (rsk, rpk) = keys_from_seed(SID);
        let receiver = Receiver::with_keys(SID, source_ids.to_vec(), rsk, rpk);
        let ds = DataSource::new(SID, rpk);
        let helper = Helper::new(SID, source_ids, n_rows);

        let mut enc_tables = HashMap::new();
        for (id, table) in tables {
            enc_tables.insert(id.clone(), ds.prepare(table).unwrap());
        }
        let converted = helper.convert(&rpk, &enc_tables).unwrap();
        receiver.join(converted).unwrap()
    }

    #[test]
    fn joins_the_intersection_only() {
        let source_ids: Vec<SourceId> = vec!["ds1".into(), "ds2".into()];
        let mut t1 = PlainTable::new();
        t1.insert("a", "x");
        t1.insert("b", "y");
        let mut t2 = PlainTable::new();
        t2.insert("a", "z");
        t2.insert("c", "w");
        let mut tables = HashMap::new();
        tables.insert(source_ids[0].clone(), t1);
        tables.insert(source_ids[1].clone(), t2);

        let joined = run_pipeline(&tables, &source_ids, 2);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.rows()[0], vec!["x".to_string(), "z".to_string()]);
    }

    #[test]
    fn corrupt_symmetric_blob_is_fatal() {
        let source_ids: Vec<SourceId> = vec!["ds1".into(), "ds2".into()];
        let (rsk, rpk) = keys_from_seed(SID);
        let receiver = Receiver::with_keys(SID, source_ids.clone(), rsk, rpk);
        let ds = DataSource::new(SID, rpk);
        let helper = Helper::new(SID, &source_ids, 1);

        let mut enc_tables = HashMap::new();
        for id in &source_ids {
            let mut table = PlainTable::new();
            table.insert("shared", "v");
            enc_tables.insert(id.clone(), ds.prepare(&table).unwrap());
        }
        let mut converted = helper.convert(&rpk, &enc_tables).unwrap();
        // Truncating a blob to a non-ciphertext length corrupts the row.
        converted[0].cval.truncate(40);

        assert!(matches!(
            receiver.join(converted),
            Err(CoreError::CorruptRow(_))
        ));
    }

    #[test]
    fn empty_stream_yields_empty_join() {
        let (rsk, rpk) = keys_from_seed(SID);
        let receiver =
            Receiver::with_keys(SID, vec!["ds1".into(), "ds2".into()], rsk, rpk);
        let joined = receiver.join(Vec::new()).unwrap();
        assert!(joined.is_empty());
    }
}
