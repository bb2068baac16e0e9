//! In-memory backend.
//!
//! `MemStore` implements `KVStore` using a `BTreeMap`, which gives the
//! unsigned lexicographic key order every layer above relies on. Its
//! iterators walk the map directly and borrow the store for their lifetime.

use std::collections::btree_map::{self, BTreeMap};
use std::ops::Bound;

use kvstack_primitives::{
    types::is_empty_range, validate_key, validate_value, StoreError, StoreResult, StoreType,
};

use crate::traits::{BoxedIterator, KVIterator, KVStore};

/// In-memory store backed by `BTreeMap`.
#[derive(Debug, Clone)]
pub struct MemStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    kind: StoreType,
}

impl MemStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::with_data(BTreeMap::new())
    }

    /// Create an empty store tagged `Transient`. Pair it with
    /// `GasConfig::transient()` and [`MemStore::clear`] it at the end of
    /// every block.
    pub fn transient() -> Self {
        Self {
            data: BTreeMap::new(),
            kind: StoreType::Transient,
        }
    }

    /// Create a store pre-populated with data.
    ///
    /// Seeding bypasses write validation, so fixtures may contain empty
    /// keys or values that `set` would reject.
    pub fn with_data(data: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Self {
            data,
            kind: StoreType::Memory,
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Insert a key-value pair without validation.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.data.insert(key, value);
    }

    /// Remove a key without validation.
    pub fn remove(&mut self, key: &[u8]) {
        self.data.remove(key);
    }

    /// Returns the number of entries in the store.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>, reverse: bool) -> MemIterator<'_> {
        let range = (!is_empty_range(start, end)).then(|| {
            let lo = start.map_or(Bound::Unbounded, Bound::Included);
            let hi = end.map_or(Bound::Unbounded, Bound::Excluded);
            self.data.range::<[u8], _>((lo, hi))
        });
        MemIterator::new(range, reverse, start, end)
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KVStore for MemStore {
    fn store_type(&self) -> StoreType {
        self.kind
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.data.contains_key(key))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        validate_value(value)?;
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        self.data.remove(key);
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

/// Cursor over a `MemStore` range. `None` range means the domain was empty.
pub struct MemIterator<'a> {
    range: Option<btree_map::Range<'a, Vec<u8>, Vec<u8>>>,
    reverse: bool,
    current: Option<(&'a [u8], &'a [u8])>,
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
}

impl<'a> MemIterator<'a> {
    fn new(
        range: Option<btree_map::Range<'a, Vec<u8>, Vec<u8>>>,
        reverse: bool,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Self {
        let mut iter = Self {
            range,
            reverse,
            current: None,
            start: start.map(<[u8]>::to_vec),
            end: end.map(<[u8]>::to_vec),
        };
        iter.advance();
        iter
    }

    fn advance(&mut self) {
        let entry = match self.range.as_mut() {
            Some(range) if self.reverse => range.next_back(),
            Some(range) => range.next(),
            None => None,
        };
        self.current = entry.map(|(k, v)| (k.as_slice(), v.as_slice()));
    }

    fn entry(&self, op: &'static str) -> (&'a [u8], &'a [u8]) {
        match self.current {
            Some(entry) => entry,
            None => panic!("{}", StoreError::InvalidIteratorUse(op)),
        }
    }
}

impl KVIterator for MemIterator<'_> {
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
        self.advance();
        Ok(())
    }

    fn key(&self) -> &[u8] {
        self.entry("key on exhausted iterator").0
    }

    fn value(&self) -> &[u8] {
        self.entry("value on exhausted iterator").1
    }

    fn error(&self) -> StoreResult<()> {
        Ok(())
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
