//! Dual-residency array handle
//!
//! A [`DualResidencyHandle`] names one logical array that may have a copy in
//! host memory, a copy in a [`DeviceArena`], or both. Exactly one side is the
//! master (authoritative) at any time; the other copy, when present, is a
//! shadow that may be stale.
//!
//! ```text
//!   DualResidencyHandle ──┐  clone = refcount + 1, never a deep copy
//!   DualResidencyHandle ──┤
//!                         ▼
//!                ┌────────────────────┐
//!                │ Shared             │      MemoryRegistry (weak)
//!                │  id, layout        │◄──── global_gc() sweeps every
//!                │  copies (refcount) │      live handle on device OOM
//!                │  RwLock<Residency> │
//!                └─────────┬──────────┘
//!                          ▼
//!      master ─► host: Option<Vec<T>>   device: Option<DeviceBuffer<T>>
//!                arrays: format ─► { BoundArray, dirty, bindings }
//! ```
//!
//! Storage is allocated lazily on the first sync to a side. A sync to the
//! non-master side performs one blocking copy of `memsize()` bytes and flips
//! the master flag. Device allocation failures trigger a local collection
//! followed by a [`MemoryRegistry::global_gc`] sweep and one retry; a second
//! failure is returned to the caller as fatal.
//!
//! Callers must not sync the same handle from uncoordinated call sites while
//! holding access guards from it; the guards borrow the handle's lock.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use skygen_tracing::performance::{record_gc, record_transfer};
use tracing::{debug, error, warn};

use super::array::{ArrayFormat, BoundArray};
use super::device::{DeviceArena, DeviceBuffer};
use super::layout::{Extent, Layout};
use super::registry::{GcOutcome, MemoryRegistry, Reclaim};
use crate::backend::Side;
use crate::error::{BackendError, Result};

/// Element types a handle can store.
pub trait Element: Copy + Default + Send + Sync + 'static {}

impl<T> Element for T where T: Copy + Default + Send + Sync + 'static {}

/// What the caller intends to do with the synced copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

struct ArrayEntry<T> {
    array: Arc<BoundArray<T>>,
    dirty: bool,
    bindings: usize,
}

struct Residency<T> {
    master: Side,
    host: Option<Vec<T>>,
    device: Option<DeviceBuffer<T>>,
    arrays: HashMap<ArrayFormat, ArrayEntry<T>>,
}

impl<T: Element> Residency<T> {
    fn is_allocated(&self, side: Side) -> bool {
        match side {
            Side::Host => self.host.is_some(),
            Side::Device => self.device.is_some(),
        }
    }

    fn slice(&self, side: Side) -> &[T] {
        match side {
            Side::Host => self.host.as_deref().unwrap_or(&[]),
            Side::Device => self.device.as_ref().map(DeviceBuffer::as_slice).unwrap_or(&[]),
        }
    }

    fn slice_mut(&mut self, side: Side) -> &mut [T] {
        match side {
            Side::Host => self.host.as_deref_mut().unwrap_or(&mut []),
            Side::Device => self.device.as_mut().map(DeviceBuffer::as_mut_slice).unwrap_or(&mut []),
        }
    }

    /// Copy the master's contents into `into`. Both sides must be allocated.
    fn copy_into(&mut self, into: Side) -> bool {
        match (into, self.host.as_mut(), self.device.as_mut()) {
            (Side::Device, Some(host), Some(device)) => device.as_mut_slice().copy_from_slice(host),
            (Side::Host, Some(host), Some(device)) => host.copy_from_slice(device.as_slice()),
            _ => return false,
        }
        true
    }

    fn mark_arrays_dirty(&mut self) {
        for entry in self.arrays.values_mut() {
            entry.dirty = true;
        }
    }

    /// Free the shadow copy and every array that is both dirty and unbound.
    fn gc(&mut self) -> GcOutcome {
        let mut outcome = GcOutcome::default();
        match self.master {
            Side::Host => {
                if let Some(buffer) = self.device.take() {
                    outcome.shadows_freed += 1;
                    outcome.device_bytes += buffer.bytes();
                }
            }
            Side::Device => {
                if self.host.take().is_some() {
                    outcome.shadows_freed += 1;
                }
            }
        }
        self.arrays.retain(|_, entry| {
            let keep = !entry.dirty || entry.bindings > 0;
            if !keep {
                outcome.arrays_freed += 1;
                outcome.device_bytes += entry.array.device_bytes();
            }
            keep
        });
        outcome
    }
}

struct Shared<T: Element> {
    id: u64,
    layout: Layout,
    device: Option<Arc<DeviceArena>>,
    copies: AtomicUsize,
    state: RwLock<Residency<T>>,
}

impl<T: Element> Shared<T> {
    fn arena(&self) -> Result<&Arc<DeviceArena>> {
        self.device.as_ref().ok_or(BackendError::NoDevice(self.id))
    }

    /// Run a device allocation, collecting garbage and retrying once if it
    /// fails for lack of memory.
    fn with_gc_retry<R>(
        &self,
        state: &mut Residency<T>,
        what: &str,
        attempt: impl Fn() -> Result<R>,
    ) -> Result<R> {
        match attempt() {
            Err(BackendError::OutOfDeviceMemory { requested, available }) => {
                warn!(
                    handle = self.id,
                    what,
                    requested,
                    available,
                    "device allocation failed; collecting garbage and retrying"
                );
                let start = Instant::now();
                let local = state.gc();
                record_gc("handle", local.arrays_freed, local.device_bytes, start.elapsed().as_micros() as u64);
                let report = MemoryRegistry::global().global_gc();
                debug!(handle = self.id, ?local, ?report, "garbage collection finished");

                attempt().inspect_err(|err| {
                    error!(handle = self.id, what, %err, "device allocation failed after garbage collection");
                })
            }
            other => other,
        }
    }

    fn ensure_allocated(&self, state: &mut Residency<T>, side: Side) -> Result<()> {
        if state.is_allocated(side) {
            return Ok(());
        }
        match side {
            Side::Host => state.host = Some(vec![T::default(); self.layout.len()]),
            Side::Device => {
                let arena = self.arena()?;
                let buffer = self.with_gc_retry(state, "buffer", || DeviceBuffer::alloc(arena, self.layout.len()))?;
                state.device = Some(buffer);
            }
        }
        Ok(())
    }

    fn sync_locked(&self, state: &mut Residency<T>, side: Side, access: Access) -> Result<()> {
        self.ensure_allocated(state, side)?;

        if state.master != side {
            let start = Instant::now();
            if state.copy_into(side) {
                let bytes = self.layout.memsize();
                record_transfer(self.id, bytes, side.inbound_direction(), start.elapsed().as_micros() as u64);
                if let Some(arena) = &self.device {
                    arena.note_transfer(side, bytes);
                }
            }
            state.master = side;
            state.mark_arrays_dirty();
        } else if access == Access::Write {
            state.mark_arrays_dirty();
        }
        Ok(())
    }

    fn array_locked(&self, state: &mut Residency<T>, format: ArrayFormat) -> Result<Arc<BoundArray<T>>> {
        if let Some(entry) = state.arrays.get(&format) {
            if !entry.dirty {
                return Ok(Arc::clone(&entry.array));
            }
        }

        self.sync_locked(state, Side::Host, Access::Read)?;
        let bindings = state.arrays.remove(&format).map_or(0, |entry| entry.bindings);
        let dense = self.layout.gather(state.slice(Side::Host));
        let reservation = match &self.device {
            Some(arena) => {
                let bytes = self.layout.extent.elements() * self.layout.element_size;
                Some(self.with_gc_retry(state, "array", || arena.reserve(bytes))?)
            }
            None => None,
        };

        let array = Arc::new(BoundArray::new(self.layout.extent, format, dense, reservation));
        state.arrays.insert(
            format,
            ArrayEntry {
                array: Arc::clone(&array),
                dirty: false,
                bindings,
            },
        );
        Ok(array)
    }

    /// Called when the last handle copy goes away.
    fn release(&self) {
        MemoryRegistry::global().unregister(self.id);
        let mut state = self.state.write();
        state.host = None;
        state.device = None;
        state.arrays.retain(|_, entry| entry.bindings > 0);
        if !state.arrays.is_empty() {
            warn!(
                handle = self.id,
                bound = state.arrays.len(),
                "handle released while arrays are still bound"
            );
        }
        debug!(handle = self.id, bytes = self.layout.memsize(), "handle storage released");
    }
}

impl<T: Element> Reclaim for Shared<T> {
    fn try_gc(&self) -> Option<GcOutcome> {
        self.state.try_write().map(|mut state| state.gc())
    }
}

/// Reference-counted handle to an array with host and device residency.
pub struct DualResidencyHandle<T: Element> {
    shared: Arc<Shared<T>>,
}

impl<T: Element> DualResidencyHandle<T> {
    /// Create a handle. No storage is allocated until the first sync.
    ///
    /// Passing `None` for `device` yields a host-only handle; syncing it to
    /// [`Side::Device`] fails with [`BackendError::NoDevice`].
    pub fn new(extent: Extent, device: Option<Arc<DeviceArena>>) -> Self {
        let registry = MemoryRegistry::global();
        let id = registry.next_id();
        let shared = Arc::new(Shared {
            id,
            layout: Layout::new::<T>(extent),
            device,
            copies: AtomicUsize::new(1),
            state: RwLock::new(Residency {
                master: Side::Host,
                host: None,
                device: None,
                arrays: HashMap::new(),
            }),
        });
        let weak = Arc::downgrade(&shared);
        registry.register(id, weak);
        Self { shared }
    }

    /// Create a host-mastered handle holding `data` (dense, x fastest).
    pub fn from_host(extent: Extent, data: &[T], device: Option<Arc<DeviceArena>>) -> Result<Self> {
        if data.len() != extent.elements() {
            return Err(BackendError::ExtentMismatch {
                expected: extent.elements(),
                actual: data.len(),
            });
        }
        let handle = Self::new(extent, device);
        {
            let mut host = handle.write_on(Side::Host)?;
            handle.layout().scatter(data, &mut host);
        }
        Ok(handle)
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn layout(&self) -> Layout {
        self.shared.layout
    }

    pub fn extent(&self) -> Extent {
        self.shared.layout.extent
    }

    /// Bytes moved by one host/device copy.
    pub fn memsize(&self) -> usize {
        self.shared.layout.memsize()
    }

    pub fn device(&self) -> Option<&Arc<DeviceArena>> {
        self.shared.device.as_ref()
    }

    /// Number of live handle copies.
    pub fn ref_count(&self) -> usize {
        self.shared.copies.load(Ordering::Acquire)
    }

    /// The authoritative side.
    pub fn master(&self) -> Side {
        self.shared.state.read().master
    }

    pub fn is_allocated(&self, side: Side) -> bool {
        self.shared.state.read().is_allocated(side)
    }

    /// Make `side` hold a valid, up-to-date copy and become the master.
    ///
    /// Any cached array representation is invalidated, since the caller may
    /// write through the synced copy.
    #[tracing::instrument(level = "trace", skip(self), fields(handle = self.shared.id))]
    pub fn sync_to(&self, side: Side) -> Result<()> {
        let mut state = self.shared.state.write();
        self.shared.sync_locked(&mut state, side, Access::Write)
    }

    /// Sync to `side` and borrow its storage for reading.
    ///
    /// Array representations are only invalidated if the master moved.
    pub fn read_on(&self, side: Side) -> Result<MappedRwLockReadGuard<'_, [T]>> {
        let mut state = self.shared.state.write();
        self.shared.sync_locked(&mut state, side, Access::Read)?;
        let state = RwLockWriteGuard::downgrade(state);
        Ok(RwLockReadGuard::map(state, move |s| s.slice(side)))
    }

    /// Sync to `side` and borrow its storage for writing.
    pub fn write_on(&self, side: Side) -> Result<MappedRwLockWriteGuard<'_, [T]>> {
        let mut state = self.shared.state.write();
        self.shared.sync_locked(&mut state, side, Access::Write)?;
        Ok(RwLockWriteGuard::map(state, move |s| s.slice_mut(side)))
    }

    /// Dense copy of the contents, synced to the host.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let host = self.read_on(Side::Host)?;
        Ok(self.shared.layout.gather(&host))
    }

    /// Read-only array representation for `format`, rebuilt from host data
    /// only when stale.
    pub fn array_binding(&self, format: ArrayFormat) -> Result<Arc<BoundArray<T>>> {
        let mut state = self.shared.state.write();
        self.shared.array_locked(&mut state, format)
    }

    /// Register a consumer of the array representation for `format`.
    ///
    /// While the returned guard lives the representation is not reclaimed by
    /// garbage collection. Dropping the guard unbinds it.
    pub fn bind_array(&self, format: ArrayFormat) -> Result<ArrayBinding<T>> {
        let mut state = self.shared.state.write();
        let array = self.shared.array_locked(&mut state, format)?;
        if let Some(entry) = state.arrays.get_mut(&format) {
            entry.bindings += 1;
        }
        Ok(ArrayBinding {
            shared: Arc::clone(&self.shared),
            format,
            array,
        })
    }

    /// Number of active bindings across all formats.
    pub fn bound_arrays(&self) -> usize {
        self.shared.state.read().arrays.values().map(|entry| entry.bindings).sum()
    }

    /// Number of cached array representations, bound or not.
    pub fn cached_arrays(&self) -> usize {
        self.shared.state.read().arrays.len()
    }

    /// Free this handle's shadow copy and stale unbound arrays.
    pub fn gc(&self) -> GcOutcome {
        self.shared.state.write().gc()
    }
}

impl<T: Element> Clone for DualResidencyHandle<T> {
    fn clone(&self) -> Self {
        self.shared.copies.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Element> Drop for DualResidencyHandle<T> {
    fn drop(&mut self) {
        if self.shared.copies.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.release();
        }
    }
}

impl<T: Element> fmt::Debug for DualResidencyHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualResidencyHandle")
            .field("id", &self.shared.id)
            .field("extent", &self.shared.layout.extent)
            .field("copies", &self.ref_count())
            .finish_non_exhaustive()
    }
}

/// An active binding to a handle's array representation.
pub struct ArrayBinding<T: Element> {
    shared: Arc<Shared<T>>,
    format: ArrayFormat,
    array: Arc<BoundArray<T>>,
}

impl<T: Element> ArrayBinding<T> {
    pub fn array(&self) -> &Arc<BoundArray<T>> {
        &self.array
    }
}

impl<T: Element> Deref for ArrayBinding<T> {
    type Target = BoundArray<T>;

    fn deref(&self) -> &BoundArray<T> {
        &self.array
    }
}

impl<T: Element> Clone for ArrayBinding<T> {
    fn clone(&self) -> Self {
        if let Some(entry) = self.shared.state.write().arrays.get_mut(&self.format) {
            entry.bindings += 1;
        }
        Self {
            shared: Arc::clone(&self.shared),
            format: self.format,
            array: Arc::clone(&self.array),
        }
    }
}

impl<T: Element> Drop for ArrayBinding<T> {
    fn drop(&mut self) {
        if let Some(entry) = self.shared.state.write().arrays.get_mut(&self.format) {
            entry.bindings = entry.bindings.saturating_sub(1);
        }
    }
}
