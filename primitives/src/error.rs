//! Error types for the kvstack store layers.
//!
//! `ErrorCode` is the stable numeric classification; `StoreError` is the
//! error value every store operation returns. Several `StoreError` variants
//! share one code (all arithmetic and invariant failures are
//! `InternalInvariantViolation`).

use std::fmt;

use crate::gas::Gas;

/// Stable error classification for store failures.
///
/// The repr values are part of the public contract and must not be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    InvalidKey = 1,
    InvalidValue = 2,
    InvalidIteratorUse = 3,
    OutOfGas = 4,
    ForbiddenComposition = 5,
    InternalInvariantViolation = 6,
    Backend = 7,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::InvalidKey => write!(f, "ERR_INVALID_KEY"),
            Self::InvalidValue => write!(f, "ERR_INVALID_VALUE"),
            Self::InvalidIteratorUse => write!(f, "ERR_INVALID_ITERATOR_USE"),
            Self::OutOfGas => write!(f, "ERR_OUT_OF_GAS"),
            Self::ForbiddenComposition => write!(f, "ERR_FORBIDDEN_COMPOSITION"),
            Self::InternalInvariantViolation => write!(f, "ERR_INTERNAL_INVARIANT"),
            Self::Backend => write!(f, "ERR_BACKEND"),
        }
    }
}

/// Error returned by store, iterator, and gas meter operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A write was attempted with an empty key.
    #[error("invalid key: key must not be empty")]
    InvalidKey,

    /// A write was attempted with an empty value.
    #[error("invalid value: value must not be empty")]
    InvalidValue,

    /// `next`/`key`/`value` was called on an iterator that is not valid.
    #[error("invalid iterator use: {0}")]
    InvalidIteratorUse(&'static str),

    /// Cumulative consumption went over the meter's limit.
    #[error("out of gas in location: {descriptor}; limit: {limit}, consumed: {consumed}")]
    OutOfGas {
        descriptor: String,
        limit: Gas,
        consumed: Gas,
    },

    /// Gas accumulation overflowed `u64`.
    #[error("gas overflow in location: {descriptor}")]
    GasOverflow { descriptor: String },

    /// A refund larger than the gas consumed so far.
    #[error("negative gas consumed in location: {descriptor}")]
    NegativeGas { descriptor: String },

    /// The requested wrapper cannot be placed over this store.
    #[error("cannot cache-wrap a {0} store")]
    ForbiddenComposition(&'static str),

    /// A store layer observed state its own bookkeeping rules out.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    /// The backing database failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// The stable classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidKey => ErrorCode::InvalidKey,
            Self::InvalidValue => ErrorCode::InvalidValue,
            Self::InvalidIteratorUse(_) => ErrorCode::InvalidIteratorUse,
            Self::OutOfGas { .. } => ErrorCode::OutOfGas,
            Self::ForbiddenComposition(_) => ErrorCode::ForbiddenComposition,
            Self::GasOverflow { .. } | Self::NegativeGas { .. } | Self::Invariant(_) => {
                ErrorCode::InternalInvariantViolation
            }
            Self::Backend(_) => ErrorCode::Backend,
        }
    }

    /// Returns true for both out-of-gas and gas-overflow failures, which
    /// callers treat alike as meter exhaustion.
    pub fn is_gas_exhaustion(&self) -> bool {
        matches!(self, Self::OutOfGas { .. } | Self::GasOverflow { .. })
    }

    pub fn backend(err: impl fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Convenience result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
