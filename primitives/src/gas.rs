//! Gas accounting for the kvstack store layers.
//!
//! A [`GasMeter`] is created at the transaction boundary and shared by
//! reference with every gas store (and every iterator those stores hand
//! out). Meters therefore take `&self` and keep their running total in a
//! [`Cell`]; a meter is confined to one thread like the stores it serves.
//!
//! [`GasConfig`] is the cost table a gas store charges against.

use std::cell::Cell;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};

/// Unsigned gas unit.
pub type Gas = u64;

/// Descriptor labels attached to every charge made by the gas store.
pub mod desc {
    pub const HAS: &str = "Has";
    pub const DELETE: &str = "Delete";
    pub const READ_FLAT: &str = "ReadFlat";
    pub const READ_PER_BYTE: &str = "ReadPerByte";
    pub const WRITE_FLAT: &str = "WriteFlat";
    pub const WRITE_PER_BYTE: &str = "WritePerByte";
    pub const ITER_NEXT: &str = "IterNext";
    pub const VALUE_PER_BYTE: &str = "ValuePerByte";
}

/// Per-byte charge for `byte_count` bytes.
///
/// Fails with `GasOverflow` when the product does not fit in `Gas`.
pub fn per_byte_cost(cost_per_byte: Gas, byte_count: usize, descriptor: &str) -> StoreResult<Gas> {
    Gas::try_from(byte_count)
        .ok()
        .and_then(|count| count.checked_mul(cost_per_byte))
        .ok_or_else(|| overflow(descriptor))
}

fn overflow(descriptor: &str) -> StoreError {
    debug!(descriptor, "gas charge overflowed");
    StoreError::GasOverflow {
        descriptor: descriptor.to_string(),
    }
}

/// Tracks gas consumption for one transaction.
pub trait GasMeter: fmt::Display {
    /// Total gas consumed so far. May exceed the limit after a failed charge.
    fn gas_consumed(&self) -> Gas;

    /// Gas consumed, clamped to the limit.
    fn gas_consumed_to_limit(&self) -> Gas;

    /// Gas left before the limit is reached.
    fn gas_remaining(&self) -> Gas;

    fn limit(&self) -> Gas;

    /// Add `amount` to the running total.
    ///
    /// Fails with `OutOfGas` once the total goes over the limit. The total
    /// is recorded before failing, so after an `OutOfGas` the meter reports
    /// consumption at or past its limit and earlier charges are kept.
    fn consume_gas(&self, amount: Gas, descriptor: &str) -> StoreResult<()>;

    /// Give back previously consumed gas.
    fn refund_gas(&self, amount: Gas, descriptor: &str) -> StoreResult<()>;

    /// True once consumption is strictly over the limit.
    fn is_past_limit(&self) -> bool;

    /// True once consumption has reached the limit.
    fn is_out_of_gas(&self) -> bool;
}

fn refund(consumed: &Cell<Gas>, amount: Gas, descriptor: &str) -> StoreResult<()> {
    match consumed.get().checked_sub(amount) {
        Some(v) => {
            consumed.set(v);
            Ok(())
        }
        None => Err(StoreError::NegativeGas {
            descriptor: descriptor.to_string(),
        }),
    }
}

/// Bounded gas meter.
#[derive(Debug, Clone)]
pub struct BasicGasMeter {
    limit: Gas,
    consumed: Cell<Gas>,
}

impl BasicGasMeter {
    /// Create a new gas meter with the given limit.
    pub fn new(limit: Gas) -> Self {
        Self {
            limit,
            consumed: Cell::new(0),
        }
    }
}

impl GasMeter for BasicGasMeter {
    fn gas_consumed(&self) -> Gas {
        self.consumed.get()
    }

    fn gas_consumed_to_limit(&self) -> Gas {
        self.consumed.get().min(self.limit)
    }

    fn gas_remaining(&self) -> Gas {
        self.limit.saturating_sub(self.consumed.get())
    }

    fn limit(&self) -> Gas {
        self.limit
    }

    fn consume_gas(&self, amount: Gas, descriptor: &str) -> StoreResult<()> {
        let Some(consumed) = self.consumed.get().checked_add(amount) else {
            self.consumed.set(Gas::MAX);
            debug!(descriptor, amount, "gas meter overflowed");
            return Err(StoreError::GasOverflow {
                descriptor: descriptor.to_string(),
            });
        };
        self.consumed.set(consumed);
        trace!(descriptor, amount, consumed, "consumed gas");

        if consumed > self.limit {
            debug!(descriptor, limit = self.limit, consumed, "out of gas");
            return Err(StoreError::OutOfGas {
                descriptor: descriptor.to_string(),
                limit: self.limit,
                consumed,
            });
        }
        Ok(())
    }

    fn refund_gas(&self, amount: Gas, descriptor: &str) -> StoreResult<()> {
        refund(&self.consumed, amount, descriptor)
    }

    fn is_past_limit(&self) -> bool {
        self.consumed.get() > self.limit
    }

    fn is_out_of_gas(&self) -> bool {
        self.consumed.get() >= self.limit
    }
}

impl fmt::Display for BasicGasMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BasicGasMeter:\n  limit: {}\n  consumed: {}",
            self.limit,
            self.consumed.get()
        )
    }
}

/// Gas meter without a limit. Consumption is still tracked.
#[derive(Debug, Clone, Default)]
pub struct InfiniteGasMeter {
    consumed: Cell<Gas>,
}

impl InfiniteGasMeter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GasMeter for InfiniteGasMeter {
    fn gas_consumed(&self) -> Gas {
        self.consumed.get()
    }

    fn gas_consumed_to_limit(&self) -> Gas {
        self.consumed.get()
    }

    fn gas_remaining(&self) -> Gas {
        Gas::MAX
    }

    fn limit(&self) -> Gas {
        Gas::MAX
    }

    fn consume_gas(&self, amount: Gas, descriptor: &str) -> StoreResult<()> {
        let Some(consumed) = self.consumed.get().checked_add(amount) else {
            self.consumed.set(Gas::MAX);
            debug!(descriptor, amount, "gas meter overflowed");
            return Err(StoreError::GasOverflow {
                descriptor: descriptor.to_string(),
            });
        };
        self.consumed.set(consumed);
        trace!(descriptor, amount, consumed, "consumed gas");
        Ok(())
    }

    fn refund_gas(&self, amount: Gas, descriptor: &str) -> StoreResult<()> {
        refund(&self.consumed, amount, descriptor)
    }

    fn is_past_limit(&self) -> bool {
        false
    }

    fn is_out_of_gas(&self) -> bool {
        false
    }
}

impl fmt::Display for InfiniteGasMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfiniteGasMeter:\n  consumed: {}", self.consumed.get())
    }
}

/// Cost table charged by the gas store.
///
/// Fields missing from a deserialized table fall back to [`GasConfig::kv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Flat charge per `has`.
    pub has_cost: Gas,
    /// Flat charge per `delete`.
    pub delete_cost: Gas,
    /// Flat charge per `get`.
    pub read_cost_flat: Gas,
    /// Per-byte charge on key and value bytes of reads and iterator seeks.
    pub read_cost_per_byte: Gas,
    /// Flat charge per `set`.
    pub write_cost_flat: Gas,
    /// Per-byte charge on key and value bytes of `set`.
    pub write_cost_per_byte: Gas,
    /// Flat charge per iterator seek (construction and every `next`).
    pub iter_next_cost_flat: Gas,
}

impl GasConfig {
    /// The standard table for persistent KV stores.
    pub const fn kv() -> Self {
        Self {
            has_cost: 1000,
            delete_cost: 1000,
            read_cost_flat: 1000,
            read_cost_per_byte: 3,
            write_cost_flat: 2000,
            write_cost_per_byte: 30,
            iter_next_cost_flat: 30,
        }
    }

    /// The cheaper table used for transient (per-block) stores.
    pub const fn transient() -> Self {
        Self {
            has_cost: 100,
            delete_cost: 100,
            read_cost_flat: 100,
            read_cost_per_byte: 0,
            write_cost_flat: 200,
            write_cost_per_byte: 3,
            iter_next_cost_flat: 3,
        }
    }

    /// Full charge for a `get` that read `key_len + value_len` bytes.
    pub fn read_cost(&self, key_len: usize, value_len: usize) -> StoreResult<Gas> {
        let per_byte =
            per_byte_cost(self.read_cost_per_byte, key_len + value_len, desc::READ_PER_BYTE)?;
        self.read_cost_flat
            .checked_add(per_byte)
            .ok_or_else(|| overflow(desc::READ_PER_BYTE))
    }

    /// Full charge for a `set` of `key_len + value_len` bytes.
    pub fn write_cost(&self, key_len: usize, value_len: usize) -> StoreResult<Gas> {
        let per_byte =
            per_byte_cost(self.write_cost_per_byte, key_len + value_len, desc::WRITE_PER_BYTE)?;
        self.write_cost_flat
            .checked_add(per_byte)
            .ok_or_else(|| overflow(desc::WRITE_PER_BYTE))
    }

    /// Full seek charge for an iterator positioned on an entry, or on
    /// nothing when `entry` is `None`.
    pub fn seek_cost(&self, entry: Option<(usize, usize)>) -> StoreResult<Gas> {
        let per_byte = match entry {
            Some((k, v)) => per_byte_cost(self.read_cost_per_byte, k + v, desc::VALUE_PER_BYTE)?,
            None => 0,
        };
        self.iter_next_cost_flat
            .checked_add(per_byte)
            .ok_or_else(|| overflow(desc::ITER_NEXT))
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self::kv()
    }
}
