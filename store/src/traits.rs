//! Store and iterator capability sets.
//!
//! Every layer of the stack (backends, prefix store, gas store, cache
//! branch) implements [`KVStore`], and every iterator they hand out
//! implements [`KVIterator`]. Callers and tests program against these
//! traits, never against a concrete layer.
//!
//! Reads take `&self` and writes take `&mut self`. Iterators borrow the
//! store that produced them, so a write into a store while one of its
//! iterators is alive does not compile.

use kvstack_primitives::{KVPair, StoreResult, StoreType};

use crate::cache::CacheStore;

/// Iterator returned by [`KVStore::iterator`] and [`KVStore::reverse_iterator`].
pub type BoxedIterator<'a> = Box<dyn KVIterator + 'a>;

/// Ordered cursor over a key range of a [`KVStore`].
pub trait KVIterator {
    /// The `(start, end)` bounds the iterator was created with, in the
    /// caller's key space. `None` means unbounded on that side.
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>);

    /// True while positioned on an entry inside the domain.
    fn valid(&self) -> bool;

    /// Step to the next entry.
    ///
    /// Returns `InvalidIteratorUse` if the iterator is not valid.
    fn next(&mut self) -> StoreResult<()>;

    /// Current key.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is not valid.
    fn key(&self) -> &[u8];

    /// Current value.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is not valid.
    fn value(&self) -> &[u8];

    fn error(&self) -> StoreResult<()>;

    /// Release the iterator. Consumes it, so it can only happen once.
    fn close(self: Box<Self>) -> StoreResult<()>;
}

/// Ordered byte key/value store.
pub trait KVStore {
    /// Type tag of the backend at the bottom of the stack.
    fn store_type(&self) -> StoreType;

    /// Value stored under `key`, or `None` if absent.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    fn has(&self, key: &[u8]) -> StoreResult<bool>;

    /// Store `value` under `key`. Both must be non-empty.
    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Remove `key`. Removing an absent key is a no-op; the key must be
    /// non-empty.
    fn delete(&mut self, key: &[u8]) -> StoreResult<()>;

    /// Ascending iterator over `[start, end)`.
    fn iterator(&self, start: Option<&[u8]>, end: Option<&[u8]>) -> StoreResult<BoxedIterator<'_>>;

    /// Descending iterator over `[start, end)`: from the largest key below
    /// `end` down to and including `start`.
    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>>;

    /// Branch this store into a write-buffering [`CacheStore`].
    ///
    /// Layers that must not sit under a cache override this and fail with
    /// `ForbiddenComposition`.
    fn cache_wrap(&mut self) -> StoreResult<CacheStore<'_>>
    where
        Self: Sized,
    {
        Ok(CacheStore::new(self))
    }
}

impl<S: KVStore> KVStore for &mut S {
    fn store_type(&self) -> StoreType {
        (**self).store_type()
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        (**self).has(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        (**self).set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>> {
        (**self).iterator(start, end)
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>> {
        (**self).reverse_iterator(start, end)
    }

    fn cache_wrap(&mut self) -> StoreResult<CacheStore<'_>> {
        (**self).cache_wrap()
    }
}

/// Drain `iter` into owned pairs, then close it.
pub fn collect_entries(mut iter: BoxedIterator<'_>) -> StoreResult<Vec<KVPair>> {
    let mut entries = Vec::new();
    while iter.valid() {
        entries.push((iter.key().to_vec(), iter.value().to_vec()));
        iter.next()?;
    }
    iter.close()?;
    Ok(entries)
}
