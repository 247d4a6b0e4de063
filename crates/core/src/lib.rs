//! Roles and table model for the multi-party private join protocol.
//!
//! Three roles cooperate so the receiver learns exactly the rows whose
//! user-ids appear in every source's table: sources *prepare* (blind
//! identifiers, encrypt values), the helper *converts* (pseudonymizes,
//! re-randomizes, attaches hints, shuffles), the receiver *joins*
//! (unblinds, buckets, combines hints, decrypts). Each role runs its
//! per-row work on a small worker pool fed through MPMC channels.

mod error;
pub mod helper;
pub mod receiver;
pub mod source;
pub mod table;

pub use error::{CoreError, Result};
pub use helper::{ConvertTask, Helper};
pub use receiver::Receiver;
pub use source::{DataSource, MAX_VALUE_LEN};
pub use table::{
    EncRow, EncRowWithHint, EncTable, EncTableWithHint, JoinTable, PlainTable, SourceId,
    ENC_ROW_LEN, ENC_ROW_WITH_HINT_MIN_LEN,
};

/// Resolves a requested worker-pool size: `0` means one thread per
/// available core.
pub(crate) fn worker_count(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
