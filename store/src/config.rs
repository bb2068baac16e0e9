//! Store configuration, read from TOML.
//!
//! ```toml
//! gas_limit = 1000000
//!
//! [kv_gas]
//! read_cost_flat = 1000
//!
//! [transient_gas]
//! write_cost_flat = 200
//! ```
//!
//! Every field is optional. Without `gas_limit` the meter is unbounded; a
//! cost missing from `[kv_gas]` or `[transient_gas]` keeps the value of the
//! corresponding standard table.

use std::path::Path;

use anyhow::Context;
use kvstack_primitives::{BasicGasMeter, Gas, GasConfig, GasMeter, InfiniteGasMeter};
use serde::Deserialize;

/// Gas settings for a store stack.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawStoreConfig")]
pub struct StoreConfig {
    /// Meter limit; `None` means an infinite meter.
    pub gas_limit: Option<Gas>,
    /// Cost table for persistent KV stores.
    pub kv_gas: GasConfig,
    /// Cost table for transient stores.
    pub transient_gas: GasConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            gas_limit: None,
            kv_gas: GasConfig::kv(),
            transient_gas: GasConfig::transient(),
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("invalid store configuration")
    }

    /// Load a configuration file from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read store config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse store config {}", path.display()))
    }

    /// A fresh meter for one transaction.
    pub fn gas_meter(&self) -> Box<dyn GasMeter> {
        match self.gas_limit {
            Some(limit) => Box::new(BasicGasMeter::new(limit)),
            None => Box::new(InfiniteGasMeter::new()),
        }
    }
}

/// On-disk shape: every cost is optional and is filled from the matching
/// standard table.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawStoreConfig {
    gas_limit: Option<Gas>,
    kv_gas: GasOverrides,
    transient_gas: GasOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GasOverrides {
    has_cost: Option<Gas>,
    delete_cost: Option<Gas>,
    read_cost_flat: Option<Gas>,
    read_cost_per_byte: Option<Gas>,
    write_cost_flat: Option<Gas>,
    write_cost_per_byte: Option<Gas>,
    iter_next_cost_flat: Option<Gas>,
}

impl GasOverrides {
    fn apply(self, base: GasConfig) -> GasConfig {
        GasConfig {
            has_cost: self.has_cost.unwrap_or(base.has_cost),
            delete_cost: self.delete_cost.unwrap_or(base.delete_cost),
            read_cost_flat: self.read_cost_flat.unwrap_or(base.read_cost_flat),
            read_cost_per_byte: self.read_cost_per_byte.unwrap_or(base.read_cost_per_byte),
            write_cost_flat: self.write_cost_flat.unwrap_or(base.write_cost_flat),
            write_cost_per_byte: self.write_cost_per_byte.unwrap_or(base.write_cost_per_byte),
            iter_next_cost_flat: self.iter_next_cost_flat.unwrap_or(base.iter_next_cost_flat),
        }
    }
}

impl From<RawStoreConfig> for StoreConfig {
    fn from(raw: RawStoreConfig) -> Self {
        Self {
            gas_limit: raw.gas_limit,
            kv_gas: raw.kv_gas.apply(GasConfig::kv()),
            transient_gas: raw.transient_gas.apply(GasConfig::transient()),
        }
    }
}
