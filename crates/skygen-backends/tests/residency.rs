//! Reference counting and residency correctness of dual-residency handles.

use std::sync::Arc;

use proptest::prelude::*;
use skygen_backends::{DeviceArena, DualResidencyHandle, Extent, MemoryRegistry, Side};

const LEN: usize = 16;

#[test]
fn copies_free_storage_once_after_the_last_drop() {
    for order in [[0usize, 1, 2, 3, 4], [4, 3, 2, 1, 0], [2, 0, 4, 1, 3]] {
        let arena = DeviceArena::unbounded("refcount");
        let original = DualResidencyHandle::<u32>::new(Extent::d1(LEN), Some(Arc::clone(&arena)));
        original.sync_to(Side::Device).unwrap();
        let id = original.id();

        let mut copies: Vec<Option<DualResidencyHandle<u32>>> = vec![Some(original)];
        for _ in 1..5 {
            let copy = copies[0].as_ref().unwrap().clone();
            copies.push(Some(copy));
        }
        assert_eq!(copies[0].as_ref().unwrap().ref_count(), 5);

        for (dropped, &index) in order.iter().enumerate() {
            assert_eq!(arena.stats().frees, 0, "freed before the last copy");
            assert!(MemoryRegistry::global().contains(id));
            copies[index].take();
            if let Some(live) = copies.iter().flatten().next() {
                assert_eq!(live.ref_count(), 4 - dropped);
            }
        }

        let stats = arena.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.frees, 1);
        assert_eq!(arena.in_use(), 0);
        assert!(!MemoryRegistry::global().contains(id));
    }
}

#[test]
fn bound_arrays_outlive_the_last_handle() {
    let arena = DeviceArena::unbounded("binding");
    let handle = DualResidencyHandle::from_host(Extent::d1(4), &[1.0f32, 2.0, 3.0, 4.0], Some(Arc::clone(&arena))).unwrap();
    let binding = handle.bind_array(skygen_backends::ArrayFormat::LINEAR).unwrap();
    drop(handle);

    assert_eq!(binding.sample(1.5, 0.0, 0.0), 2.5);
    assert_eq!(arena.in_use(), 16);
    drop(binding);
    assert_eq!(arena.in_use(), 0);
}

#[derive(Debug, Clone)]
enum Op {
    Write { side: Side, index: usize, value: i64 },
    Sync(Side),
    Gc,
}

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Host), Just(Side::Device)]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (side(), 0..LEN, any::<i64>()).prop_map(|(side, index, value)| Op::Write { side, index, value }),
        side().prop_map(Op::Sync),
        Just(Op::Gc),
    ]
}

proptest! {
    #[test]
    fn reads_observe_the_latest_write(ops in prop::collection::vec(op(), 1..40), read_side in side()) {
        let arena = DeviceArena::unbounded("residency");
        let handle = DualResidencyHandle::<i64>::new(Extent::d1(LEN), Some(arena));
        let mut model = vec![0i64; LEN];

        for op in ops {
            match op {
                Op::Write { side, index, value } => {
                    handle.write_on(side).unwrap()[index] = value;
                    model[index] = value;
                }
                Op::Sync(side) => handle.sync_to(side).unwrap(),
                Op::Gc => {
                    handle.gc();
                }
            }
        }

        let observed = handle.read_on(read_side).unwrap().to_vec();
        prop_assert_eq!(observed, model);
    }
}

#[test]
fn pitched_three_dimensional_data_survives_round_trips() {
    let arena = DeviceArena::unbounded("pitched");
    let extent = Extent::d3(5, 3, 2);
    let dense: Vec<f32> = (0..extent.elements()).map(|v| v as f32).collect();
    let handle = DualResidencyHandle::from_host(extent, &dense, Some(Arc::clone(&arena))).unwrap();

    assert!(handle.layout().pitch_elements > 5);
    {
        let mut device = handle.write_on(Side::Device).unwrap();
        let at = handle.layout().index(4, 2, 1);
        device[at] = -1.0;
    }

    let mut expected = dense;
    expected[(3 + 2) * 5 + 4] = -1.0;
    assert_eq!(handle.to_vec().unwrap(), expected);
    assert_eq!(arena.stats().bytes_to_device as usize, handle.memsize());
}
