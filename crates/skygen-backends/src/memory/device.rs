//! Device memory arena
//!
//! Device memory is modelled as a byte budget with allocation accounting.
//! Every device-resident buffer and every bound array holds a
//! [`DeviceReservation`] against its arena, so exhausting the arena produces
//! the same out-of-memory failure a real accelerator would, and freeing a
//! buffer gives its bytes back.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{BackendError, Result};

/// Counters describing an arena's lifetime activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    pub allocations: u64,
    pub frees: u64,
    pub failed_allocations: u64,
    pub bytes_to_device: u64,
    pub bytes_to_host: u64,
    pub peak_bytes: usize,
}

#[derive(Debug)]
pub struct DeviceArena {
    name: String,
    capacity: usize,
    in_use: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicU64,
    frees: AtomicU64,
    failed_allocations: AtomicU64,
    bytes_to_device: AtomicU64,
    bytes_to_host: AtomicU64,
}

impl DeviceArena {
    /// Arena holding at most `capacity` bytes.
    pub fn new(name: impl Into<String>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            capacity,
            in_use: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            allocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            failed_allocations: AtomicU64::new(0),
            bytes_to_device: AtomicU64::new(0),
            bytes_to_host: AtomicU64::new(0),
        })
    }

    pub fn unbounded(name: impl Into<String>) -> Arc<Self> {
        Self::new(name, usize::MAX)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.in_use())
    }

    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            bytes_to_device: self.bytes_to_device.load(Ordering::Relaxed),
            bytes_to_host: self.bytes_to_host.load(Ordering::Relaxed),
            peak_bytes: self.peak.load(Ordering::Relaxed),
        }
    }

    /// Reserve `bytes`, failing with [`BackendError::OutOfDeviceMemory`]
    /// if the arena cannot hold them.
    pub fn reserve(self: &Arc<Self>, bytes: usize) -> Result<DeviceReservation> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            let next = match current.checked_add(bytes) {
                Some(next) if next <= self.capacity => next,
                _ => {
                    self.failed_allocations.fetch_add(1, Ordering::Relaxed);
                    return Err(BackendError::OutOfDeviceMemory {
                        requested: bytes,
                        available: self.capacity.saturating_sub(current),
                    });
                }
            };
            match self
                .in_use
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.peak.fetch_max(next, Ordering::Relaxed);
                    self.allocations.fetch_add(1, Ordering::Relaxed);
                    return Ok(DeviceReservation {
                        arena: Arc::clone(self),
                        bytes,
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }

    pub(crate) fn note_transfer(&self, into: crate::backend::Side, bytes: usize) {
        let counter = match into {
            crate::backend::Side::Device => &self.bytes_to_device,
            crate::backend::Side::Host => &self.bytes_to_host,
        };
        counter.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn release(&self, bytes: usize) {
        self.in_use.fetch_sub(bytes, Ordering::AcqRel);
        self.frees.fetch_add(1, Ordering::Relaxed);
    }
}

/// Bytes held against a [`DeviceArena`]; returned on drop.
#[derive(Debug)]
pub struct DeviceReservation {
    arena: Arc<DeviceArena>,
    bytes: usize,
}

impl DeviceReservation {
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn arena(&self) -> &Arc<DeviceArena> {
        &self.arena
    }
}

impl Drop for DeviceReservation {
    fn drop(&mut self) {
        self.arena.release(self.bytes);
    }
}

/// A device-resident buffer of `T`.
#[derive(Debug)]
pub struct DeviceBuffer<T> {
    data: Vec<T>,
    reservation: DeviceReservation,
}

impl<T: Copy + Default> DeviceBuffer<T> {
    /// Allocate `len` zero-initialized elements on `arena`.
    pub fn alloc(arena: &Arc<DeviceArena>, len: usize) -> Result<Self> {
        let reservation = arena.reserve(len * std::mem::size_of::<T>())?;
        Ok(Self {
            data: vec![T::default(); len],
            reservation,
        })
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn bytes(&self) -> usize {
        self.reservation.bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservations_are_returned_on_drop() {
        let arena = DeviceArena::new("test", 1024);
        let a = arena.reserve(600).unwrap();
        assert_eq!(arena.in_use(), 600);
        assert_eq!(arena.available(), 424);

        let err = arena.reserve(500).unwrap_err();
        assert_eq!(
            err,
            BackendError::OutOfDeviceMemory {
                requested: 500,
                available: 424
            }
        );

        drop(a);
        assert_eq!(arena.in_use(), 0);
        let stats = arena.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.frees, 1);
        assert_eq!(stats.failed_allocations, 1);
        assert_eq!(stats.peak_bytes, 600);
    }

    #[test]
    fn buffers_account_element_size() {
        let arena = DeviceArena::new("test", 64);
        let buffer = DeviceBuffer::<u32>::alloc(&arena, 16).unwrap();
        assert_eq!(buffer.bytes(), 64);
        assert!(buffer.as_slice().iter().all(|&v| v == 0));
        assert!(DeviceBuffer::<u8>::alloc(&arena, 1).is_err());
    }
}
