//! Gas-metered view over a parent store.
//!
//! `GasStore` forwards every operation to its parent unchanged and charges a
//! shared [`GasMeter`] according to a [`GasConfig`]:
//!
//! | operation            | charge                                                       |
//! |----------------------|--------------------------------------------------------------|
//! | `get`                | `read_cost_flat` + `read_cost_per_byte × (key + value)`      |
//! | `has`                | `has_cost`                                                   |
//! | `set`                | `write_cost_flat` + `write_cost_per_byte × (key + value)`    |
//! | `delete`             | `delete_cost`                                                |
//! | iterator creation    | one seek charge for the initial position                     |
//! | iterator `next`      | one seek charge for the position being left                  |
//!
//! A seek charge is `read_cost_per_byte × (key + value)` of the current
//! entry (when there is one) followed by `iter_next_cost_flat`.
//!
//! Charges are never rolled back: when the meter runs out the failing
//! operation returns `OutOfGas`, the parent is left as it was before that
//! operation, and every earlier charge stays on the meter. A per-byte
//! product that does not fit in `Gas` fails the operation with
//! `GasOverflow` before anything is charged for it.

use kvstack_primitives::gas::{desc, per_byte_cost};
use kvstack_primitives::{
    validate_key, validate_value, GasConfig, GasMeter, StoreError, StoreResult, StoreType,
};
use tracing::warn;

use crate::cache::CacheStore;
use crate::traits::{BoxedIterator, KVIterator, KVStore};

/// Store that charges gas for every operation before forwarding it.
pub struct GasStore<'m, S> {
    parent: S,
    meter: &'m dyn GasMeter,
    config: GasConfig,
}

impl<'m, S: KVStore> GasStore<'m, S> {
    /// Wrap `parent`, charging `meter` according to `config`.
    pub fn new(parent: S, meter: &'m dyn GasMeter, config: GasConfig) -> Self {
        Self {
            parent,
            meter,
            config,
        }
    }

    pub fn config(&self) -> &GasConfig {
        &self.config
    }

    pub fn meter(&self) -> &'m dyn GasMeter {
        self.meter
    }

    /// Unwrap, returning the parent store.
    pub fn into_parent(self) -> S {
        self.parent
    }

    fn wrap<'a>(&'a self, parent: BoxedIterator<'a>) -> StoreResult<BoxedIterator<'a>> {
        let iter = GasIterator::new(parent, self.meter, &self.config)?;
        Ok(Box::new(iter))
    }
}

impl<S: KVStore> KVStore for GasStore<'_, S> {
    fn store_type(&self) -> StoreType {
        self.parent.store_type()
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.meter
            .consume_gas(self.config.read_cost_flat, desc::READ_FLAT)?;
        let value = self.parent.get(key)?;
        let read_len = key.len() + value.as_ref().map_or(0, Vec::len);
        let per_byte =
            per_byte_cost(self.config.read_cost_per_byte, read_len, desc::READ_PER_BYTE)?;
        self.meter.consume_gas(per_byte, desc::READ_PER_BYTE)?;
        Ok(value)
    }

    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        self.meter.consume_gas(self.config.has_cost, desc::HAS)?;
        self.parent.has(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        validate_value(value)?;
        self.meter
            .consume_gas(self.config.write_cost_flat, desc::WRITE_FLAT)?;
        let per_byte = per_byte_cost(
            self.config.write_cost_per_byte,
            key.len() + value.len(),
            desc::WRITE_PER_BYTE,
        )?;
        self.meter.consume_gas(per_byte, desc::WRITE_PER_BYTE)?;
        self.parent.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        self.meter
            .consume_gas(self.config.delete_cost, desc::DELETE)?;
        self.parent.delete(key)
    }

    fn iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>> {
        let parent = self.parent.iterator(start, end)?;
        self.wrap(parent)
    }

    fn reverse_iterator(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> StoreResult<BoxedIterator<'_>> {
        let parent = self.parent.reverse_iterator(start, end)?;
        self.wrap(parent)
    }

    /// Always fails with `ForbiddenComposition`.
    fn cache_wrap(&mut self) -> StoreResult<CacheStore<'_>> {
        warn!("refusing to cache-wrap a gas store");
        Err(StoreError::ForbiddenComposition("gas"))
    }
}

/// Iterator that charges a seek for its initial position and for every
/// position it steps away from.
pub struct GasIterator<'a> {
    parent: BoxedIterator<'a>,
    meter: &'a dyn GasMeter,
    config: &'a GasConfig,
}

impl<'a> GasIterator<'a> {
    fn new(
        parent: BoxedIterator<'a>,
        meter: &'a dyn GasMeter,
        config: &'a GasConfig,
    ) -> StoreResult<Self> {
        let iter = Self {
            parent,
            meter,
            config,
        };
        iter.consume_seek_gas()?;
        Ok(iter)
    }

    fn consume_seek_gas(&self) -> StoreResult<()> {
        if self.parent.valid() {
            let bytes = self.parent.key().len() + self.parent.value().len();
            let per_byte =
                per_byte_cost(self.config.read_cost_per_byte, bytes, desc::VALUE_PER_BYTE)?;
            self.meter.consume_gas(per_byte, desc::VALUE_PER_BYTE)?;
        }
        self.meter
            .consume_gas(self.config.iter_next_cost_flat, desc::ITER_NEXT)
    }
}

impl KVIterator for GasIterator<'_> {
    fn domain(&self) -> (Option<&[u8]>, Option<&[u8]>) {
        self.parent.domain()
    }

    fn valid(&self) -> bool {
        self.parent.valid()
    }

    fn next(&mut self) -> StoreResult<()> {
        self.consume_seek_gas()?;
        self.parent.next()
    }

    fn key(&self) -> &[u8] {
        self.parent.key()
    }

    fn value(&self) -> &[u8] {
        self.parent.value()
    }

    fn error(&self) -> StoreResult<()> {
        self.parent.error()
    }

    fn close(self: Box<Self>) -> StoreResult<()> {
        self.parent.close()
    }
}

#[cfg(test)]
mod tests {
    use kvstack_primitives::{BasicGasMeter, ErrorCode, InfiniteGasMeter};

    use super::*;
    use crate::mem_store::MemStore;
    use crate::prefix::PrefixStore;

    fn test_config() -> GasConfig {
        GasConfig {
            has_cost: 1000,
            delete_cost: 1000,
            read_cost_flat: 1000,
            read_cost_per_byte: 3,
            write_cost_flat: 2000,
            write_cost_per_byte: 30,
            iter_next_cost_flat: 30,
        }
    }

    #[test]
    fn test_set_get_delete_gas() {
        let meter = BasicGasMeter::new(10_000);
        let mut backend = MemStore::new();
        let mut store = GasStore::new(&mut backend, &meter, test_config());

        assert_eq!(store.get(b"key1").unwrap(), None);
        // 1000 + 3 * 4
        assert_eq!(meter.gas_consumed(), 1012);

        store.set(b"key1", b"value1").unwrap();
        // 2000 + 30 * (4 + 6)
        assert_eq!(meter.gas_consumed(), 1012 + 2300);

        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        // 1000 + 3 * (4 + 6)
        assert_eq!(meter.gas_consumed(), 1012 + 2300 + 1030);

        store.delete(b"key1").unwrap();
        assert_eq!(meter.gas_consumed(), 1012 + 2300 + 1030 + 1000);

        assert_eq!(store.get(b"key1").unwrap(), None);
        assert_eq!(meter.gas_consumed(), 6354);
        assert_eq!(store.store_type(), StoreType::Memory);
    }

    #[test]
    fn test_has_gas() {
        let meter = BasicGasMeter::new(10_000);
        let mut backend = MemStore::new();
        backend.set(b"k", b"v").unwrap();
        let store = GasStore::new(&mut backend, &meter, test_config());

        assert!(store.has(b"k").unwrap());
        assert!(!store.has(b"missing").unwrap());
        assert_eq!(meter.gas_consumed(), 2000);
    }

    #[test]
    fn test_out_of_gas_on_set() {
        let meter = BasicGasMeter::new(0);
        let mut backend = MemStore::new();
        let mut store = GasStore::new(&mut backend, &meter, GasConfig::kv());

        let err = store.set(b"k", b"v").unwrap_err();
        assert_eq!(err.code(), ErrorCode::OutOfGas);
        assert!(meter.gas_consumed() >= meter.limit());
        assert!(meter.is_out_of_gas());
        drop(store);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_per_byte_charge_failure_leaves_parent_untouched() {
        // enough for the flat part of the write but not the per-byte part
        let meter = BasicGasMeter::new(2000);
        let mut backend = MemStore::new();
        let mut store = GasStore::new(&mut backend, &meter, test_config());

        let err = store.set(b"key", b"value").unwrap_err();
        assert!(matches!(
            err,
            StoreError::OutOfGas { ref descriptor, .. } if descriptor == desc::WRITE_PER_BYTE
        ));
        assert_eq!(meter.gas_consumed(), 2000 + 240);
        drop(store);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_validation_precedes_charging() {
        let meter = BasicGasMeter::new(10_000);
        let mut backend = MemStore::new();
        let mut store = GasStore::new(&mut backend, &meter, test_config());

        assert_eq!(store.set(b"", b"v"), Err(StoreError::InvalidKey));
        assert_eq!(store.set(b"k", b""), Err(StoreError::InvalidValue));
        assert_eq!(store.delete(b""), Err(StoreError::InvalidKey));
        assert_eq!(meter.gas_consumed(), 0);
    }

    #[test]
    fn test_iterator_gas() {
        let meter = BasicGasMeter::new(100_000);
        let mut backend = MemStore::new();
        backend.set(b"key1", b"value1").unwrap();
        backend.set(b"key2", b"value2").unwrap();
        let store = GasStore::new(&mut backend, &meter, test_config());

        let mut iter = store.iterator(None, None).unwrap();
        // seek on key1: 3 * 10 + 30
        assert_eq!(meter.gas_consumed(), 60);
        assert_eq!(iter.key(), b"key1");
        assert_eq!(iter.value(), b"value1");
        // key/value/valid/domain are free
        assert_eq!(meter.gas_consumed(), 60);

        iter.next().unwrap();
        assert_eq!(meter.gas_consumed(), 120);
        assert_eq!(iter.key(), b"key2");

        iter.next().unwrap();
        assert_eq!(meter.gas_consumed(), 180);
        assert!(!iter.valid());
        iter.close().unwrap();
        assert_eq!(meter.gas_consumed(), 180);
    }

    #[test]
    fn test_empty_iterator_charges_flat_seek() {
        let meter = BasicGasMeter::new(1000);
        let store = GasStore::new(MemStore::new(), &meter, test_config());
        let iter = store.reverse_iterator(None, None).unwrap();
        assert!(!iter.valid());
        assert_eq!(meter.gas_consumed(), 30);
    }

    #[test]
    fn test_out_of_gas_during_iteration() {
        let mut backend = MemStore::new();
        backend.set(b"key1", b"value1").unwrap();
        backend.set(b"key2", b"value2").unwrap();

        // construction costs 60, the per-byte part of the first step another 30
        let meter = BasicGasMeter::new(80);
        let store = GasStore::new(&mut backend, &meter, test_config());
        let mut iter = store.iterator(None, None).unwrap();
        assert_eq!(meter.gas_consumed(), 60);

        let err = iter.next().unwrap_err();
        assert!(matches!(
            err,
            StoreError::OutOfGas { ref descriptor, .. } if descriptor == desc::VALUE_PER_BYTE
        ));
        assert!(meter.gas_consumed() >= meter.limit());
        // the parent did not advance
        assert_eq!(iter.key(), b"key1");
    }

    #[test]
    fn test_out_of_gas_on_iterator_construction() {
        let mut backend = MemStore::new();
        backend.set(b"key1", b"value1").unwrap();
        let meter = BasicGasMeter::new(10);
        let store = GasStore::new(&mut backend, &meter, test_config());
        assert!(store.iterator(None, None).is_err());
        assert!(meter.is_past_limit());
    }

    #[test]
    fn test_cache_wrap_forbidden() {
        let meter = InfiniteGasMeter::new();
        let mut store = GasStore::new(MemStore::new(), &meter, GasConfig::kv());
        let err = store.cache_wrap().unwrap_err();
        assert_eq!(err, StoreError::ForbiddenComposition("gas"));
        assert_eq!(err.code(), ErrorCode::ForbiddenComposition);

        // also refused through a borrowed handle
        let mut borrowed = &mut store;
        assert!(KVStore::cache_wrap(&mut borrowed).is_err());
    }

    #[test]
    fn test_gas_over_prefix_charges_local_key_bytes() {
        let meter = BasicGasMeter::new(100_000);
        let mut backend = MemStore::new();
        let mut store = GasStore::new(
            PrefixStore::new(&mut backend, b"long/prefix/".to_vec()),
            &meter,
            test_config(),
        );
        store.set(b"k", b"v").unwrap();
        // only the local key is visible to the gas layer: 2000 + 30 * 2
        assert_eq!(meter.gas_consumed(), 2060);
        drop(store);
        assert_eq!(backend.get(b"long/prefix/k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_overflowing_read_charge_fails_on_unbounded_limit() {
        let config = GasConfig {
            read_cost_flat: 0,
            read_cost_per_byte: u64::MAX,
            ..test_config()
        };
        let mut backend = MemStore::new();
        backend.set(b"key", b"value").unwrap();
        let meter = BasicGasMeter::new(u64::MAX);
        let store = GasStore::new(&mut backend, &meter, config);

        let err = store.get(b"key").unwrap_err();
        assert_eq!(
            err,
            StoreError::GasOverflow {
                descriptor: desc::READ_PER_BYTE.into()
            }
        );
        assert_eq!(err.code(), ErrorCode::InternalInvariantViolation);
        assert_eq!(meter.gas_consumed(), 0);
    }

    #[test]
    fn test_overflowing_write_charge_leaves_parent_untouched() {
        let config = GasConfig {
            write_cost_per_byte: u64::MAX,
            ..test_config()
        };
        let meter = InfiniteGasMeter::new();
        let mut backend = MemStore::new();
        let mut store = GasStore::new(&mut backend, &meter, config);

        let err = store.set(b"key", b"value").unwrap_err();
        assert!(matches!(
            err,
            StoreError::GasOverflow { ref descriptor } if descriptor == desc::WRITE_PER_BYTE
        ));
        assert!(err.is_gas_exhaustion());
        // only the flat part reached the meter
        assert_eq!(meter.gas_consumed(), 2000);
        drop(store);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_overflowing_seek_charge_fails_iteration() {
        let config = GasConfig {
            read_cost_per_byte: u64::MAX,
            ..test_config()
        };
        let mut backend = MemStore::new();
        backend.set(b"key", b"value").unwrap();
        let meter = BasicGasMeter::new(u64::MAX);
        let store = GasStore::new(&mut backend, &meter, config);

        let err = store.iterator(None, None).err().unwrap();
        assert!(matches!(
            err,
            StoreError::GasOverflow { ref descriptor } if descriptor == desc::VALUE_PER_BYTE
        ));

        // an empty range only pays the flat part
        let iter = store.iterator(Some(&b"z"[..]), None).unwrap();
        assert!(!iter.valid());
        assert_eq!(meter.gas_consumed(), 30);
    }
}
