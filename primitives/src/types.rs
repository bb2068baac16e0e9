//! Store type tags and byte-key helpers shared by every store layer.

use std::fmt;

use crate::error::{StoreError, StoreResult};

/// Owned key/value pair as yielded by a drained iterator.
pub type KVPair = (Vec<u8>, Vec<u8>);

/// Kind of backend a store ultimately sits on. Wrappers report their
/// parent's tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreType {
    /// In-memory store that lives for the whole process.
    Memory,
    /// In-memory store discarded at the end of each block.
    Transient,
    /// On-disk store.
    Persistent,
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "StoreTypeMemory",
            Self::Transient => "StoreTypeTransient",
            Self::Persistent => "StoreTypePersistent",
        };
        f.write_str(name)
    }
}

/// Reject the empty key on writes.
pub fn validate_key(key: &[u8]) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey);
    }
    Ok(())
}

/// Reject the empty value on writes. Absence is expressed by deleting.
pub fn validate_value(value: &[u8]) -> StoreResult<()> {
    if value.is_empty() {
        return Err(StoreError::InvalidValue);
    }
    Ok(())
}

/// Smallest byte string strictly greater than every string starting with
/// `prefix`.
///
/// Trailing `0xFF` bytes are dropped and the last remaining byte is
/// incremented. Returns `None` when nothing remains (the empty prefix, or a
/// prefix made only of `0xFF`): there is no upper bound in that case.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let last = prefix.iter().rposition(|&b| b != 0xFF)?;
    let mut end = prefix[..=last].to_vec();
    end[last] += 1;
    Some(end)
}

/// `true` if both bounds are present and the range they describe is empty.
pub fn is_empty_range(start: Option<&[u8]>, end: Option<&[u8]>) -> bool {
    matches!((start, end), (Some(s), Some(e)) if s >= e)
}
