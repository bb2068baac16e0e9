//! Gas totals for scripted operation sequences.

mod common;

use std::collections::BTreeMap;

use common::{init_tracing, scenario_costs};
use kvstack_store::{
    collect_entries, BasicGasMeter, ErrorCode, GasConfig, GasMeter, GasStore, InfiniteGasMeter,
    KVStore, MemStore, StoreError, StoreResult,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Get(Vec<u8>),
    Has(Vec<u8>),
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
    Scan,
}

fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..4, 1..3)
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        arb_key().prop_map(Op::Get),
        arb_key().prop_map(Op::Has),
        (arb_key(), prop::collection::vec(any::<u8>(), 1..5)).prop_map(|(k, v)| Op::Set(k, v)),
        arb_key().prop_map(Op::Delete),
        Just(Op::Scan),
    ]
}

/// Gas one operation costs against `model`, which it then updates.
fn expected_cost(costs: &GasConfig, model: &mut BTreeMap<Vec<u8>, Vec<u8>>, op: &Op) -> u64 {
    match op {
        Op::Get(k) => costs
            .read_cost(k.len(), model.get(k).map_or(0, Vec::len))
            .unwrap(),
        Op::Has(_) => costs.has_cost,
        Op::Set(k, v) => {
            model.insert(k.clone(), v.clone());
            costs.write_cost(k.len(), v.len()).unwrap()
        }
        Op::Delete(k) => {
            model.remove(k);
            costs.delete_cost
        }
        Op::Scan => {
            // one seek at creation, then one per step off each entry
            let first = model.iter().next().map(|(k, v)| (k.len(), v.len()));
            let mut total = costs.seek_cost(first).unwrap();
            for (k, v) in model.iter() {
                total += costs.seek_cost(Some((k.len(), v.len()))).unwrap();
            }
            total
        }
    }
}

fn apply<S: KVStore>(store: &mut S, op: &Op) -> StoreResult<()> {
    match op {
        Op::Get(k) => store.get(k).map(drop),
        Op::Has(k) => store.has(k).map(drop),
        Op::Set(k, v) => store.set(k, v),
        Op::Delete(k) => store.delete(k),
        Op::Scan => collect_entries(store.iterator(None, None)?).map(drop),
    }
}

proptest! {
    #[test]
    fn prop_gas_is_additive(ops in prop::collection::vec(arb_op(), 0..24)) {
        let costs = scenario_costs();
        let meter = InfiniteGasMeter::new();
        let mut store = GasStore::new(MemStore::new(), &meter, costs);
        let mut model = BTreeMap::new();

        let mut expected = 0;
        for op in &ops {
            apply(&mut store, op).unwrap();
            expected += expected_cost(&costs, &mut model, op);
            prop_assert_eq!(meter.gas_consumed(), expected, "after {:?}", op);
        }
    }

    #[test]
    fn prop_gas_exhaustion_stops_at_first_overrun(
        ops in prop::collection::vec(arb_op(), 1..24),
        fraction in 0.0f64..1.0,
    ) {
        let costs = scenario_costs();
        let mut model = BTreeMap::new();
        let per_op: Vec<u64> = ops.iter().map(|op| expected_cost(&costs, &mut model, op)).collect();
        let total: u64 = per_op.iter().sum();
        let limit = (total as f64 * fraction) as u64;
        prop_assume!(limit < total);

        // first step whose running total goes over the limit
        let mut running = 0;
        let failing = per_op
            .iter()
            .position(|cost| {
                running += cost;
                running > limit
            })
            .unwrap();

        let meter = BasicGasMeter::new(limit);
        let mut store = GasStore::new(MemStore::new(), &meter, costs);
        for (i, op) in ops.iter().enumerate() {
            let result = apply(&mut store, op);
            if i < failing {
                prop_assert!(result.is_ok(), "step {} failed early: {:?}", i, result);
            } else {
                let err = result.unwrap_err();
                prop_assert_eq!(err.code(), ErrorCode::OutOfGas);
                break;
            }
        }
        prop_assert!(meter.gas_consumed() >= meter.limit());
        prop_assert!(meter.is_past_limit());
    }
}

#[test]
fn test_set_get_delete_total() {
    init_tracing();
    let meter = BasicGasMeter::new(100_000);
    let mut store = GasStore::new(MemStore::new(), &meter, scenario_costs());

    assert_eq!(store.get(b"key1").unwrap(), None);
    store.set(b"key1", b"value1").unwrap();
    assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
    store.delete(b"key1").unwrap();
    assert_eq!(store.get(b"key1").unwrap(), None);

    assert_eq!(meter.gas_consumed(), 6354);
}

#[test]
fn test_out_of_gas_on_set() {
    let meter = BasicGasMeter::new(0);
    let mut store = GasStore::new(MemStore::new(), &meter, scenario_costs());
    let err = store.set(b"k", b"v").unwrap_err();
    assert!(matches!(err, StoreError::OutOfGas { limit: 0, .. }));
    assert!(meter.gas_consumed() >= meter.limit());
    assert!(store.has(b"k").is_err());
}

#[test]
fn test_out_of_gas_on_iterator_step() {
    init_tracing();
    let mut backend = MemStore::new();
    backend.set(b"a", b"1").unwrap();
    backend.set(b"b", b"2").unwrap();

    // creation costs 3 * 2 + 30 = 36; the next step needs another 36
    let meter = BasicGasMeter::new(50);
    let store = GasStore::new(&mut backend, &meter, scenario_costs());
    let mut iter = store.iterator(None, None).unwrap();
    assert!(iter.valid());
    assert_eq!(iter.value(), b"1");
    assert_eq!(meter.gas_consumed(), 36);

    let err = iter.next().unwrap_err();
    assert_eq!(err.code(), ErrorCode::OutOfGas);
    assert!(meter.is_past_limit());
}

#[test]
fn test_transient_table_is_cheaper() {
    let kv_meter = InfiniteGasMeter::new();
    let transient_meter = InfiniteGasMeter::new();
    let mut kv = GasStore::new(MemStore::new(), &kv_meter, GasConfig::kv());
    let mut transient = GasStore::new(MemStore::new(), &transient_meter, GasConfig::transient());

    for store in [&mut kv, &mut transient] {
        store.set(b"key", b"value").unwrap();
        store.get(b"key").unwrap();
        store.delete(b"key").unwrap();
    }
    assert_eq!(kv_meter.gas_consumed(), 2240 + 1024 + 1000);
    assert_eq!(transient_meter.gas_consumed(), 224 + 100 + 100);
}
