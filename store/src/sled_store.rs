//! Persistent backend on an embedded sled database.

use std::ops::Bound;
use std::path::Path;

use kvstack_primitives::types::is_empty_range;
use kvstack_primitives::{validate_key, validate_value, StoreError, StoreResult, StoreType};
use sled::IVec;
use tracing::debug;

use crate::traits::{BoxedIterator, KVIterator, KVStore};

/// Store backed by a sled `Db`. Cloning shares the same database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(StoreError::backend)?;
        debug!(path = %path.display(), "opened sled store");
        Ok(Self { db })
    }

    /// Open a database that is removed when the last handle is dropped.
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(StoreError::backend)?;
        debug!("opened temporary sled store");
        Ok(Self { db })
    }

    /// Force buffered writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush().map_err(StoreError::backend)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>, reverse: bool) -> SledIterator {
        let iter = (!is_empty_range(start, end)).then(|| {
            let lo = start.map_or(Bound::Unbounded, |s| Bound::Included(s.to_vec()));
            let hi = end.map_or(Bound::Unbounded, |e| Bound::Excluded(e.to_vec()));
            self.db.range::<Vec<u8>, _>((lo, hi))
        });
        SledIterator::new(iter, reverse, start, end)
    }
}

impl KVStore for SledStore {
    fn store_type(&self) -> StoreType {
        StoreType::Persistent
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let value = self.db.get(key).map_err(StoreError::backend)?;
        Ok(value.map(|v| v.to_vec()))
    }

    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        self.db.contains_key(key).map_err(StoreError::backend)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        validate_value(value)?;
        self.db.insert(key, value).map_err(StoreError::backend)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        self.db.remove(key).map_err(StoreError::backend)?;
        Ok(())
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>> {
        Ok(Box::new(self.range(start, end, false)))
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>> {
        Ok(Box::new(self.range(start, end, true)))
    }
}

/// Cursor over a sled range.
///
/// A read failure while stepping ends the iteration; the failure is kept and
/// reported by `error()` and by any further `next()`.
pub struct SledIterator {
    iter: Option<sled::Iter>,
    reverse: bool,
    current: Option<(IVec, IVec)>,
    failure: Option<StoreError>,
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
}

impl SledIterator {
    fn new(
        iter: Option<sled::Iter>,
        reverse: bool,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Self {
        let mut cursor = Self {
            iter,
            reverse,
            current: None,
            failure: None,
            start: start.map(<[u8]>::to_vec),
            end: end.map(<[u8]>::to_vec),
        };
        cursor.advance();
        cursor
    }

    fn advance(&mut self) {
        let step = match self.iter.as_mut() {
            Some(iter) if self.reverse => iter.next_back(),
            Some(iter) => iter.next(),
            None => None,
        };
        self.current = match step {
            Some(Ok(entry)) => Some(entry),
            Some(Err(err)) => {
                self.failure = Some(StoreError::backend(err));
                None
            }
            None => None,
        };
    }

    fn entry(&self, op: &'static str) -> &(IVec, IVec) {
        match &self.current {
            Some(entry) => entry,
            None => panic!("{}", StoreError::InvalidIteratorUse(op)),
        }
    }
}

impl KVIterator for SledIterator {
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        (self.start.as_deref(), self.end.as_deref())
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn next(&mut self) -> StoreResult<()> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.current.is_none() {
            return Err(StoreError::InvalidIteratorUse("next on exhausted iterator"));
        }
        self.advance();
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn key(&self) -> &[u8] {
        &self.entry("key on exhausted iterator").0
    }

    fn value(&self) -> &[u8] {
        &self.entry("value on exhausted iterator").1
    }

    fn error(&self) -> StoreResult<()> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
