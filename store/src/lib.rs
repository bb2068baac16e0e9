//! `kvstack-store` — composable byte key/value stores.
//!
//! Every layer implements the same `KVStore` capability set, so layers stack
//! in any permitted order over any backend:
//!
//! - `MemStore` / `SledStore` — in-memory and persistent backends
//! - `PrefixStore` — scopes a parent to one key prefix
//! - `GasStore` — charges a shared `GasMeter` for every operation
//! - `CacheStore` — write-buffering branch returned by `cache_wrap`
//! - `StoreConfig` — gas limit and cost tables loaded from TOML
//!
//! Error codes, gas meters and cost tables live in `kvstack-primitives` and
//! are re-exported here.

pub mod cache;
pub mod config;
pub mod gas_store;
pub mod mem_store;
pub mod prefix;
pub mod sled_store;
pub mod traits;

// Re-export commonly used types at the crate root.
pub use cache::CacheStore;
pub use config::StoreConfig;
pub use gas_store::GasStore;
pub use mem_store::MemStore;
pub use prefix::PrefixStore;
pub use sled_store::SledStore;
pub use traits::{collect_entries, BoxedIterator, KVIterator, KVStore};

pub use kvstack_primitives::{
    BasicGasMeter, ErrorCode, Gas, GasConfig, GasMeter, InfiniteGasMeter, KVPair, StoreError,
    StoreResult, StoreType,
};
