//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use kvstack_store::{collect_entries, GasConfig, KVPair, KVStore};

/// Install a test-writer subscriber filtered by `RUST_LOG`. Safe to call
/// from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The cost table used by the gas scenarios.
pub fn scenario_costs() -> GasConfig {
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

pub fn concat(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = a.to_vec();
    out.extend_from_slice(b);
    out
}

pub fn all_entries<S: KVStore>(store: &S) -> Vec<KVPair> {
    collect_entries(store.iterator(None, None).unwrap()).unwrap()
}

pub fn all_entries_rev<S: KVStore>(store: &S) -> Vec<KVPair> {
    collect_entries(store.reverse_iterator(None, None).unwrap()).unwrap()
}
