//! `kvstack-primitives` — shared vocabulary for the kvstack store layers.
//!
//! This crate provides the error codes and `StoreError`, gas units and the
//! `GasMeter` capability with its bounded and unbounded implementations, the
//! `GasConfig` cost table, store type tags, and the byte-key helpers
//! (`prefix_end`, key/value validation) used by every wrapper in
//! `kvstack-store`.

pub mod error;
pub mod gas;
pub mod types;

// Re-export commonly used types at the crate root for convenience.
pub use error::{ErrorCode, StoreError, StoreResult};
pub use gas::{BasicGasMeter, Gas, GasConfig, GasMeter, InfiniteGasMeter};
pub use types::{prefix_end, validate_key, validate_value, KVPair, StoreType};
