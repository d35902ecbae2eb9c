//! Reactive garbage collection when device memory runs out.
//!
//! Kept in its own test binary with a single test: the sweep is
//! process-wide and would otherwise race with other tests' handles.

use std::sync::Arc;

use skygen_backends::{BackendError, DeviceArena, DualResidencyHandle, Extent, Side};

#[test]
fn allocation_failure_collects_and_retries_once() {
    skygen_tracing::init_test_tracing();
    let arena = DeviceArena::new("small", 256);

    // 128 bytes of stale device shadow once A moves back to the host
    let a = DualResidencyHandle::from_host(Extent::d1(32), &[9u32; 32], Some(Arc::clone(&arena))).unwrap();
    a.sync_to(Side::Device).unwrap();
    a.sync_to(Side::Host).unwrap();
    assert!(a.is_allocated(Side::Device));
    assert_eq!(arena.in_use(), 128);

    // B needs 192 bytes: fails, sweeps A's shadow, then succeeds
    let b = DualResidencyHandle::<u32>::new(Extent::d1(48), Some(Arc::clone(&arena)));
    b.sync_to(Side::Device).unwrap();
    assert!(b.is_allocated(Side::Device));
    assert!(!a.is_allocated(Side::Device));
    assert_eq!(arena.stats().failed_allocations, 1);
    assert_eq!(a.to_vec().unwrap(), vec![9; 32]);

    // C can never fit: one retry, then the error surfaces
    let c = DualResidencyHandle::<u32>::new(Extent::d1(128), Some(Arc::clone(&arena)));
    let err = c.sync_to(Side::Device).unwrap_err();
    assert!(matches!(err, BackendError::OutOfDeviceMemory { requested: 512, .. }));
    assert_eq!(arena.stats().failed_allocations, 3);
    assert!(b.is_allocated(Side::Device), "the master copy is never collected");

    stale_unbound_arrays_are_collected_for_device_space();
}

fn stale_unbound_arrays_are_collected_for_device_space() {
    let arena = DeviceArena::new("arrays", 64);
    let table = DualResidencyHandle::from_host(Extent::d1(8), &[1.0f32; 8], Some(Arc::clone(&arena))).unwrap();
    let _ = table.array_binding(skygen_backends::ArrayFormat::POINT).unwrap();
    assert_eq!(arena.in_use(), 32);

    // invalidate the cached array; it is now dirty and unbound
    table.sync_to(Side::Host).unwrap();

    let other = DualResidencyHandle::<f32>::new(Extent::d1(12), Some(Arc::clone(&arena)));
    other.sync_to(Side::Device).unwrap();
    assert_eq!(table.cached_arrays(), 0);
    assert_eq!(arena.in_use(), 48);
}
