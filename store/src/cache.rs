//! Write-buffering branch over a parent store.
//!
//! A `CacheStore` buffers writes and makes them visible to subsequent reads
//! through the branch. On [`CacheStore::write`] the buffered writes are
//! flushed to the parent in ascending key order; on
//! [`CacheStore::discard`] (or drop) they are thrown away.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

use kvstack_primitives::types::is_empty_range;
use kvstack_primitives::{validate_key, validate_value, KVPair, StoreError, StoreResult, StoreType};
use tracing::debug;

use crate::traits::{collect_entries, BoxedIterator, KVIterator, KVStore};

/// Branch of a store with its own write buffer.
pub struct CacheStore<'a> {
    parent: &'a mut dyn KVStore,
    /// Buffered writes: key → Some(value) for sets, key → None for deletions.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> CacheStore<'a> {
    pub fn new(parent: &'a mut dyn KVStore) -> Self {
        Self {
            parent,
            writes: BTreeMap::new(),
        }
    }

    /// Flush buffered writes to the parent and empty the buffer.
    ///
    /// If the parent rejects a write the buffer is left intact; entries
    /// flushed before the failure have already reached the parent.
    pub fn write(&mut self) -> StoreResult<()> {
        for (key, value) in &self.writes {
            match value {
                Some(value) => self.parent.set(key, value)?,
                None => self.parent.delete(key)?,
            }
        }
        debug!(entries = self.writes.len(), "flushed cache branch");
        self.writes.clear();
        Ok(())
    }

    /// Drop every buffered write.
    pub fn discard(&mut self) {
        self.writes.clear();
    }

    /// Number of keys touched (set or deleted) in this branch.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Parent range overlaid with the buffered writes in `[start, end)`,
    /// ascending.
    fn merged(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> StoreResult<Vec<KVPair>> {
        let mut view: BTreeMap<Vec<u8>, Vec<u8>> =
            collect_entries(self.parent.iterator(start, end)?)?
                .into_iter()
                .collect();

        if !is_empty_range(start, end) {
            let lo = start.map_or(Bound::Unbounded, Bound::Included);
            let hi = end.map_or(Bound::Unbounded, Bound::Excluded);
            for (key, value) in self.writes.range::<[u8], _>((lo, hi)) {
                match value {
                    Some(value) => {
                        view.insert(key.clone(), value.clone());
                    }
                    None => {
                        view.remove(key);
                    }
                }
            }
        }
        Ok(view.into_iter().collect())
    }

    fn snapshot(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        reverse: bool,
    ) -> StoreResult<BoxedIterator<'_>> {
        let mut entries = self.merged(start, end)?;
        if reverse {
            entries.reverse();
        }
        Ok(Box::new(CacheIterator::new(entries, start, end)))
    }
}

impl fmt::Debug for CacheStore<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("store_type", &self.parent.store_type())
            .field("buffered", &self.writes.len())
            .finish()
    }
}

impl KVStore for CacheStore<'_> {
    fn store_type(&self) -> StoreType {
        self.parent.store_type()
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.parent.get(key),
        }
    }

    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        match self.writes.get(key) {
            Some(value) => Ok(value.is_some()),
            None => self.parent.has(key),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        validate_value(value)?;
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>> {
        self.snapshot(start, end, false)
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>> {
        self.snapshot(start, end, true)
    }
}

/// Iterator over a materialized merged view, already in yield order.
pub struct CacheIterator {
    entries: std::vec::IntoIter<KVPair>,
    current: Option<KVPair>,
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
}

impl CacheIterator {
    fn new(entries: Vec<KVPair>, start: Option<&[u8]>, end: Option<&[u8]>) -> Self {
        let mut entries = entries.into_iter();
        let current = entries.next();
        Self {
            entries,
            current,
            start: start.map(<[u8]>::to_vec),
            end: end.map(<[u8]>::to_vec),
        }
    }

    fn entry(&self, op: &'static str) -> &KVPair {
        match &self.current {
            Some(entry) => entry,
            None => panic!("{}", StoreError::InvalidIteratorUse(op)),
        }
    }
}

impl KVIterator for CacheIterator {
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        (self.start.as_deref(), self.end.as_deref())
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> StoreResult<()> {
        if self.current.is_none() {
            return Err(StoreError::InvalidIteratorUse("next on exhausted iterator"));
        }
        self.current = self.entries.next();
        Ok(())
    }

    fn key(&self) -> &[u8] {
        &self.entry("key on exhausted iterator").0
    }

    fn value(&self) -> &[u8] {
        &self.entry("value on exhausted iterator").1
    }

    fn error(&self) -> StoreResult<()> {
        Ok(())
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
