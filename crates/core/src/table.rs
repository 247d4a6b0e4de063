//! Plain, encrypted, and joined table containers, plus the fixed-width
//! row layouts used on the streaming boundary.

use std::collections::HashMap;

use mppj_crypto::{Ciphertext, CIPHERTEXT_LEN};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Identifier a data source is configured and authenticated under.
pub type SourceId = String;

/// A source's input: user-id → value, values at most 30 bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlainTable(HashMap<String, String>);

impl PlainTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row, replacing any previous value for the same uid.
    pub fn insert(&mut self, uid: impl Into<String>, val: impl Into<String>) {
        self.0.insert(uid.into(), val.into());
    }

    pub fn get(&self, uid: &str) -> Option<&str> {
        self.0.get(uid).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for PlainTable {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        PlainTable(iter.into_iter().collect())
    }
}

/// One prepared row: blinded uid and encrypted value, as produced by a
/// source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncRow {
    pub cuid: Ciphertext,
    pub cval: Vec<Ciphertext>,
}

pub type EncTable = Vec<EncRow>;

/// One converted row, as produced by the helper: the pseudonym
/// ciphertext, the symmetrically encrypted value blob, the blinded
/// key-carrier, and this source's hint share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncRowWithHint {
    pub cnyme: Ciphertext,
    pub cval: Vec<u8>,
    pub cval_key: Ciphertext,
    pub chint: Ciphertext,
}

pub type EncTableWithHint = Vec<EncRowWithHint>;

/// Minimum wire length of a serialized [`EncRow`]: blinded uid plus one
/// value chunk. Values under 30 bytes fit one chunk (132 bytes total);
/// an exactly-aligned value gains a pad chunk, which the frame carries.
pub const ENC_ROW_LEN: usize = 2 * CIPHERTEXT_LEN;

/// Minimum wire length of a serialized [`EncRowWithHint`]: three
/// ciphertexts; the symmetric blob takes the rest of the frame.
pub const ENC_ROW_WITH_HINT_MIN_LEN: usize = 3 * CIPHERTEXT_LEN;

impl EncRow {
    /// Layout: `cuid || cval[0] || …`; the chunk count follows from the
    /// enclosing frame length.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.cval.is_empty() {
            return Err(CoreError::EmptyValue);
        }
        let mut out = Vec::with_capacity((1 + self.cval.len()) * CIPHERTEXT_LEN);
        out.extend_from_slice(&self.cuid.serialize().map_err(CoreError::RowSerialization)?);
        for chunk in &self.cval {
            out.extend_from_slice(&chunk.serialize().map_err(CoreError::RowSerialization)?);
        }
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<EncRow> {
        if data.len() < ENC_ROW_LEN {
            return Err(CoreError::RowTooShort {
                got: data.len(),
                min: ENC_ROW_LEN,
            });
        }
        if data.len() % CIPHERTEXT_LEN != 0 {
            return Err(CoreError::MisalignedRow { got: data.len() });
        }
        let cuid = Ciphertext::deserialize(&data[..CIPHERTEXT_LEN])
            .map_err(CoreError::RowSerialization)?;
        let cval = data[CIPHERTEXT_LEN..]
            .chunks_exact(CIPHERTEXT_LEN)
            .map(Ciphertext::deserialize)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(CoreError::RowSerialization)?;
        Ok(EncRow { cuid, cval })
    }
}

impl EncRowWithHint {
    /// Layout: `cnyme || cval_key || chint || cval`, the blob length
    /// given by the enclosing frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(ENC_ROW_WITH_HINT_MIN_LEN + self.cval.len());
        out.extend_from_slice(&self.cnyme.serialize().map_err(CoreError::RowSerialization)?);
        out.extend_from_slice(
            &self
                .cval_key
                .serialize()
                .map_err(CoreError::RowSerialization)?,
        );
        out.extend_from_slice(&self.chint.serialize().map_err(CoreError::RowSerialization)?);
        out.extend_from_slice(&self.cval);
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<EncRowWithHint> {
        if data.len() < ENC_ROW_WITH_HINT_MIN_LEN {
            return Err(CoreError::RowTooShort {
                got: data.len(),
                min: ENC_ROW_WITH_HINT_MIN_LEN,
            });
        }
        let cnyme = Ciphertext::deserialize(&data[..CIPHERTEXT_LEN])
            .map_err(CoreError::RowSerialization)?;
        let cval_key = Ciphertext::deserialize(&data[CIPHERTEXT_LEN..2 * CIPHERTEXT_LEN])
            .map_err(CoreError::RowSerialization)?;
        let chint = Ciphertext::deserialize(&data[2 * CIPHERTEXT_LEN..3 * CIPHERTEXT_LEN])
            .map_err(CoreError::RowSerialization)?;
        Ok(EncRowWithHint {
            cnyme,
            cval: data[3 * CIPHERTEXT_LEN..].to_vec(),
            cval_key,
            chint,
        })
    }
}

/// The join output: one row per intersecting uid, one column per source
/// in the configured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    source_ids: Vec<SourceId>,
    rows: Vec<Vec<String>>,
}

impl JoinTable {
    pub fn new(source_ids: Vec<SourceId>) -> Self {
        Self {
            source_ids,
            rows: Vec::new(),
        }
    }

    pub fn source_ids(&self) -> &[SourceId] {
        &self.source_ids
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends one result row given per-source values; columns follow
    /// the configured source order.
    pub fn insert(&mut self, values: &HashMap<SourceId, String>) -> Result<()> {
        let mut row = vec![String::new(); self.source_ids.len()];
        for (source_id, value) in values {
            let col = self
                .source_ids
                .iter()
                .position(|id| id == source_id)
                .ok_or_else(|| CoreError::UnknownSource(source_id.clone()))?;
            row[col] = value.clone();
        }
        self.rows.push(row);
        Ok(())
    }

    /// Multiset equality over rows; row order is nondeterministic by
    /// design, so only contents are compared.
    pub fn same_contents(&self, other: &JoinTable) -> bool {
        if self.source_ids != other.source_ids || self.rows.len() != other.rows.len() {
            return false;
        }
        let mut counts: HashMap<&[String], isize> = HashMap::new();
        for row in &self.rows {
            *counts.entry(row.as_slice()).or_default() += 1;
        }
        for row in &other.rows {
            match counts.get_mut(row.as_slice()) {
                Some(count) => *count -= 1,
                None => return false,
            }
        }
        counts.values().all(|&count| count == 0)
    }
}

/// Plaintext reference join over the same inputs; the oracle the
/// protocol output is checked against.
pub fn plain_intersect(
    tables: &HashMap<SourceId, PlainTable>,
    sources: &[SourceId],
) -> Result<JoinTable> {
    let mut grouped: HashMap<&str, HashMap<SourceId, String>> = HashMap::new();
    for (source_id, table) in tables {
        for (uid, val) in table.iter() {
            grouped
                .entry(uid)
                .or_default()
                .insert(source_id.clone(), val.clone());
        }
    }

    let mut joined = JoinTable::new(sources.to_vec());
    for values in grouped.values() {
        if values.len() == tables.len() {
            joined.insert(values)?;
        }
    }
    Ok(joined)
}

/// Generates `amount` unique uids.
pub fn gen_uids(amount: usize) -> Vec<String> {
    (0..amount).map(|_| Uuid::new_v4().to_string()).collect()
}

/// Builds one test table per source: a shared intersection plus
/// per-source filler rows, values distinct across the whole run.
pub fn gen_test_tables(
    source_ids: &[SourceId],
    n_rows: usize,
    intersection_size: usize,
) -> HashMap<SourceId, PlainTable> {
    let intersection: Vec<String> = (0..intersection_size)
        .map(|i| format!("join_key_{i}"))
        .collect();
    let mut value_counter = 0usize;
    let mut tables = HashMap::new();
    for source_id in source_ids {
        let mut table = PlainTable::new();
        for uid in &intersection {
            table.insert(uid.clone(), format!("value_{value_counter}"));
            value_counter += 1;
        }
        for i in 0..n_rows.saturating_sub(intersection_size) {
            table.insert(
                format!("{source_id}_{i}"),
                format!("non_join_value_{value_counter}"),
            );
            value_counter += 1;
        }
        tables.insert(source_id.clone(), table);
    }
    tables
}
