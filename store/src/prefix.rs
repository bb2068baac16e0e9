//! Prefix-scoped view over a parent store.
//!
//! A `PrefixStore` narrows its parent to the keys starting with a fixed
//! prefix `p`. Callers see *local* keys (prefix stripped); the parent holds
//! *global* keys (`p ∥ local`). Point operations prepend the prefix, ranges
//! are rewritten against the parent, and iterators strip the prefix back off
//! and stop as soon as the parent steps outside it.
//!
//! The empty prefix is legal and makes the store a transparent forwarder.

use kvstack_primitives::{
    prefix_end, validate_key, validate_value, StoreError, StoreResult, StoreType,
};
use tracing::trace;

use crate::traits::{BoxedIterator, KVIterator, KVStore};

/// Store whose key space is the parent's keys under a fixed prefix.
#[derive(Debug, Clone)]
pub struct PrefixStore<S> {
    parent: S,
    prefix: Vec<u8>,
}

impl<S: KVStore> PrefixStore<S> {
    /// Wrap `parent`, scoping every key under `prefix`.
    pub fn new(parent: S, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            parent,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn parent(&self) -> &S {
        &self.parent
    }

    /// Unwrap, returning the parent store.
    pub fn into_parent(self) -> S {
        self.parent
    }

    /// Global key for a local key.
    fn key(&self, key: &[u8]) -> Vec<u8> {
        let mut global = Vec::with_capacity(self.prefix.len() + key.len());
        global.extend_from_slice(&self.prefix);
        global.extend_from_slice(key);
        global
    }

    /// Parent-side bounds for a local range. An unbounded local start maps
    /// to the prefix itself; an unbounded local end maps to `prefix_end`,
    /// which is itself unbounded when the prefix is empty or all `0xFF`.
    fn translate(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> (Vec<u8>, Option<Vec<u8>>) {
        let new_start = match start {
            Some(start) => self.key(start),
            None => self.prefix.clone(),
        };
        let new_end = match end {
            Some(end) => Some(self.key(end)),
            None => prefix_end(&self.prefix),
        };
        (new_start, new_end)
    }

    fn wrap<'a>(
        &'a self,
        parent: BoxedIterator<'a>,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> BoxedIterator<'a> {
        Box::new(PrefixIterator::new(parent, &self.prefix, start, end))
    }
}

impl<S: KVStore> KVStore for PrefixStore<S> {
    fn store_type(&self) -> StoreType {
        self.parent.store_type()
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.parent.get(&self.key(key))
    }

    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        self.parent.has(&self.key(key))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        validate_value(value)?;
        let global = self.key(key);
        self.parent.set(&global, value)
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        let global = self.key(key);
        self.parent.delete(&global)
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>> {
        let (new_start, new_end) = self.translate(start, end);
        trace!(prefix = ?self.prefix, start = ?new_start, end = ?new_end, "prefix iterator");
        let parent = self.parent.iterator(Some(new_start.as_slice()), new_end.as_deref())?;
        Ok(self.wrap(parent, start, end))
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>> {
        let (new_start, new_end) = self.translate(start, end);
        trace!(
            prefix = ?self.prefix,
            start = ?new_start,
            end = ?new_end,
            "prefix reverse iterator"
        );
        let parent = self
            .parent
            .reverse_iterator(Some(new_start.as_slice()), new_end.as_deref())?;
        Ok(self.wrap(parent, start, end))
    }
}

/// Iterator over a `PrefixStore` range, yielding local keys.
///
/// Validity is cached: it is true only while the parent is valid and
/// positioned on a key under the prefix, and it is recomputed on every step.
pub struct PrefixIterator<'a> {
    parent: BoxedIterator<'a>,
    prefix: &'a [u8],
    start: Option<Vec<u8>>,
    end: Option<Vec<u8>>,
    valid: bool,
}

impl<'a> PrefixIterator<'a> {
    fn new(
        parent: BoxedIterator<'a>,
        prefix: &'a [u8],
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Self {
        let valid = parent.valid() && parent.key().starts_with(prefix);
        Self {
            parent,
            prefix,
            start: start.map(<[u8]>::to_vec),
            end: end.map(<[u8]>::to_vec),
            valid,
        }
    }
}

impl KVIterator for PrefixIterator<'_> {
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        (self.start.as_deref(), self.end.as_deref())
    }

    fn valid(&self) -> bool {
        self.valid
    }

    fn next(&mut self) -> StoreResult<()> {
        if !self.valid {
            return Err(StoreError::InvalidIteratorUse("next on exhausted prefix iterator"));
        }
        let step = self.parent.next();
        self.valid = self.parent.valid() && self.parent.key().starts_with(self.prefix);
        step
    }

    fn key(&self) -> &[u8] {
        if !self.valid {
            panic!("{}", StoreError::InvalidIteratorUse("key on exhausted prefix iterator"));
        }
        match self.parent.key().strip_prefix(self.prefix) {
            Some(local) => local,
            None => panic!(
                "{}",
                StoreError::Invariant(format!(
                    "parent key {:?} is outside prefix {:?}",
                    self.parent.key(),
                    self.prefix
                ))
            ),
        }
    }

    fn value(&self) -> &[u8] {
        if !self.valid {
            panic!("{}", StoreError::InvalidIteratorUse("value on exhausted prefix iterator"));
        }
        self.parent.value()
    }

    fn error(&self) -> StoreResult<()> {
        if !self.valid {
            return Err(StoreError::InvalidIteratorUse("invalid prefix iterator"));
        }
        self.parent.error()
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        self.parent.close()
    }
}
