//! Bounded output sink
//!
//! Drawn stars land in a fixed-capacity columnar table. Lanes claim runs of
//! slots with one atomic add on a shared counter. A claim may run past the
//! end of the table; the slots beyond capacity are void, and the lane keeps
//! the draws it could not place as pending work for the next launch.
//!
//! ```text
//!   next ──► fetch_add(n)
//!   ┌───┬───┬───┬───┬───┬───┬───┬───┐
//!   │ ■ │ ■ │ ■ │ ■ │ ■ │ □ │ □ │ □ │ capacity
//!   └───┴───┴───┴───┴───┴───┴───┴───┘
//!                         └ claims start here; indices ≥ capacity are void
//! ```
//!
//! Columns are atomics so lanes on different threads can fill disjoint slots
//! through a shared reference.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// One drawn star.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StarRecord {
    /// Hemisphere of the projection the star was drawn in
    pub proj_idx: u32,
    pub proj_x: f32,
    pub proj_y: f32,
    /// Galactic longitude in degrees, `[0, 360)`
    pub l: f64,
    /// Galactic latitude in degrees
    pub b: f64,
    pub abs_mag: f32,
    pub dist_mod: f32,
    /// Galactocentric position in parsecs
    pub xyz: [f32; 3],
    pub comp: u32,
    /// Extinction at the star
    pub am: f32,
    /// Extinction at infinite distance along the same line of sight
    pub am_inf: f32,
    pub hidden: bool,
}

impl StarRecord {
    /// Placeholder for a draw that fell outside the projection.
    pub fn off_projection(proj_idx: u32, proj_x: f32, proj_y: f32) -> Self {
        Self {
            proj_idx,
            proj_x,
            proj_y,
            hidden: true,
            ..Self::default()
        }
    }

    /// Observed magnitude without extinction.
    pub fn apparent_mag(&self) -> f32 {
        self.abs_mag + self.dist_mod
    }
}

/// Slot-addressed output the sampler writes into.
pub trait StarSink: Sync {
    fn capacity(&self) -> usize;

    /// Claim `count` consecutive slots and return the first. Slots at or past
    /// [`StarSink::capacity`] are void.
    fn reserve(&self, count: usize) -> usize;

    /// Slots claimed so far, including void ones.
    fn reserved(&self) -> usize;

    fn write(&self, slot: usize, star: &StarRecord);

    /// Slots holding a star.
    fn len(&self) -> usize {
        self.reserved().min(self.capacity())
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.reserved() >= self.capacity()
    }
}

struct F32Column(Box<[AtomicU32]>);

impl F32Column {
    fn new(len: usize) -> Self {
        Self((0..len).map(|_| AtomicU32::new(0)).collect())
    }

    fn set(&self, slot: usize, value: f32) {
        self.0[slot].store(value.to_bits(), Ordering::Relaxed);
    }

    fn get(&self, slot: usize) -> f32 {
        f32::from_bits(self.0[slot].load(Ordering::Relaxed))
    }
}

struct F64Column(Box<[AtomicU64]>);

impl F64Column {
    fn new(len: usize) -> Self {
        Self((0..len).map(|_| AtomicU64::new(0)).collect())
    }

    fn set(&self, slot: usize, value: f64) {
        self.0[slot].store(value.to_bits(), Ordering::Relaxed);
    }

    fn get(&self, slot: usize) -> f64 {
        f64::from_bits(self.0[slot].load(Ordering::Relaxed))
    }
}

struct U32Column(Box<[AtomicU32]>);

impl U32Column {
    fn new(len: usize) -> Self {
        Self((0..len).map(|_| AtomicU32::new(0)).collect())
    }

    fn set(&self, slot: usize, value: u32) {
        self.0[slot].store(value, Ordering::Relaxed);
    }

    fn get(&self, slot: usize) -> u32 {
        self.0[slot].load(Ordering::Relaxed)
    }
}

/// Fixed-capacity columnar star table.
pub struct StarTable {
    capacity: usize,
    next: AtomicUsize,
    proj_idx: U32Column,
    proj_x: F32Column,
    proj_y: F32Column,
    l: F64Column,
    b: F64Column,
    abs_mag: F32Column,
    dist_mod: F32Column,
    xyz: [F32Column; 3],
    comp: U32Column,
    am: F32Column,
    am_inf: F32Column,
    hidden: Box<[AtomicBool]>,
}

impl StarTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            next: AtomicUsize::new(0),
            proj_idx: U32Column::new(capacity),
            proj_x: F32Column::new(capacity),
            proj_y: F32Column::new(capacity),
            l: F64Column::new(capacity),
            b: F64Column::new(capacity),
            abs_mag: F32Column::new(capacity),
            dist_mod: F32Column::new(capacity),
            xyz: [F32Column::new(capacity), F32Column::new(capacity), F32Column::new(capacity)],
            comp: U32Column::new(capacity),
            am: F32Column::new(capacity),
            am_inf: F32Column::new(capacity),
            hidden: (0..capacity).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn set_projected(&self, slot: usize, proj_idx: u32, x: f32, y: f32) {
        self.proj_idx.set(slot, proj_idx);
        self.proj_x.set(slot, x);
        self.proj_y.set(slot, y);
    }

    pub fn set_lb(&self, slot: usize, l: f64, b: f64) {
        self.l.set(slot, l);
        self.b.set(slot, b);
    }

    pub fn set_magnitudes(&self, slot: usize, abs_mag: f32, dist_mod: f32) {
        self.abs_mag.set(slot, abs_mag);
        self.dist_mod.set(slot, dist_mod);
    }

    pub fn set_xyz(&self, slot: usize, xyz: [f32; 3]) {
        for (column, value) in self.xyz.iter().zip(xyz) {
            column.set(slot, value);
        }
    }

    pub fn set_comp(&self, slot: usize, comp: u32) {
        self.comp.set(slot, comp);
    }

    pub fn set_extinction(&self, slot: usize, am: f32, am_inf: f32) {
        self.am.set(slot, am);
        self.am_inf.set(slot, am_inf);
    }

    pub fn set_hidden(&self, slot: usize, hidden: bool) {
        self.hidden[slot].store(hidden, Ordering::Relaxed);
    }

    /// Star in `slot`, if the slot has been filled.
    pub fn get(&self, slot: usize) -> Option<StarRecord> {
        (slot < self.len()).then(|| StarRecord {
            proj_idx: self.proj_idx.get(slot),
            proj_x: self.proj_x.get(slot),
            proj_y: self.proj_y.get(slot),
            l: self.l.get(slot),
            b: self.b.get(slot),
            abs_mag: self.abs_mag.get(slot),
            dist_mod: self.dist_mod.get(slot),
            xyz: [self.xyz[0].get(slot), self.xyz[1].get(slot), self.xyz[2].get(slot)],
            comp: self.comp.get(slot),
            am: self.am.get(slot),
            am_inf: self.am_inf.get(slot),
            hidden: self.hidden[slot].load(Ordering::Relaxed),
        })
    }

    pub fn stars(&self) -> Vec<StarRecord> {
        (0..self.len()).filter_map(|slot| self.get(slot)).collect()
    }

    /// Mark the first `count` slots as taken without writing them.
    pub fn prefill(&self, count: usize) {
        self.next.store(count, Ordering::Relaxed);
    }

    /// Forget every stored star.
    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }

    /// Take out the stored stars and reset the table.
    pub fn drain(&self) -> Vec<StarRecord> {
        let stars = self.stars();
        self.reset();
        stars
    }
}

impl StarSink for StarTable {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn reserve(&self, count: usize) -> usize {
        self.next.fetch_add(count, Ordering::Relaxed)
    }

    fn reserved(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }

    fn write(&self, slot: usize, star: &StarRecord) {
        if slot >= self.capacity {
            return;
        }
        self.set_projected(slot, star.proj_idx, star.proj_x, star.proj_y);
        self.set_lb(slot, star.l, star.b);
        self.set_magnitudes(slot, star.abs_mag, star.dist_mod);
        self.set_xyz(slot, star.xyz);
        self.set_comp(slot, star.comp);
        self.set_extinction(slot, star.am, star.am_inf);
        self.set_hidden(slot, star.hidden);
    }
}

impl std::fmt::Debug for StarTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StarTable")
            .field("capacity", &self.capacity)
            .field("reserved", &self.reserved())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn concurrent_claims_are_disjoint() {
        let table = StarTable::with_capacity(1000);
        let starts: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| (0..50).map(|_| table.reserve(3)).collect::<Vec<_>>()))
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });
        let slots: HashSet<usize> = starts.iter().flat_map(|&s| s..s + 3).collect();
        assert_eq!(slots.len(), 8 * 50 * 3);
        assert_eq!(table.reserved(), 1200);
        assert_eq!(table.len(), 1000);
        assert!(table.is_full());
    }

    #[test]
    fn writes_past_capacity_are_dropped() {
        let table = StarTable::with_capacity(2);
        let star = StarRecord {
            l: 12.5,
            comp: 3,
            ..StarRecord::default()
        };
        let first = table.reserve(3);
        for slot in first..first + 3 {
            table.write(slot, &star);
        }
        assert_eq!(table.stars(), vec![star, star]);
        assert_eq!(table.get(2), None);
    }

    #[test]
    fn drain_empties_the_table() {
        let table = StarTable::with_capacity(4);
        let slot = table.reserve(1);
        table.write(slot, &StarRecord::off_projection(1, 1.2, -0.9));
        let drained = table.drain();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].hidden);
        assert!(table.is_empty());
        assert_eq!(table.reserve(1), 0);
    }
}
