//! Read-only interpolatable array bindings
//!
//! A [`BoundArray`] is a dense, immutable copy of a handle's contents built
//! for lookups: point fetches with clamp addressing, and for `f32` data a
//! trilinear sample. Coordinates are in element index space, so integer
//! coordinates land exactly on stored elements.

use super::device::DeviceReservation;
use super::layout::Extent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Nearest element
    Point,
    /// Trilinear interpolation
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    /// Out-of-range coordinates read the nearest edge element
    Clamp,
}

/// Key under which a handle caches its array representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayFormat {
    pub filter: FilterMode,
    pub address: AddressMode,
}

impl ArrayFormat {
    pub const POINT: Self = Self {
        filter: FilterMode::Point,
        address: AddressMode::Clamp,
    };
    pub const LINEAR: Self = Self {
        filter: FilterMode::Linear,
        address: AddressMode::Clamp,
    };
}

#[derive(Debug)]
pub struct BoundArray<T> {
    extent: Extent,
    format: ArrayFormat,
    data: Vec<T>,
    reservation: Option<DeviceReservation>,
}

impl<T: Copy> BoundArray<T> {
    pub(crate) fn new(extent: Extent, format: ArrayFormat, data: Vec<T>, reservation: Option<DeviceReservation>) -> Self {
        Self {
            extent,
            format,
            data,
            reservation,
        }
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn format(&self) -> ArrayFormat {
        self.format
    }

    /// Device bytes held by this representation.
    pub fn device_bytes(&self) -> usize {
        self.reservation.as_ref().map_or(0, DeviceReservation::bytes)
    }

    /// Element at `(x, y, z)` with clamp addressing.
    pub fn fetch(&self, x: i64, y: i64, z: i64) -> T {
        let cx = clamp_index(x, self.extent.width);
        let cy = clamp_index(y, self.extent.height);
        let cz = clamp_index(z, self.extent.depth);
        self.data[(cz * self.extent.height + cy) * self.extent.width + cx]
    }
}

impl BoundArray<f32> {
    /// Filtered lookup at fractional coordinates.
    pub fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        match self.format.filter {
            FilterMode::Point => self.fetch(
                (x + 0.5).floor() as i64,
                (y + 0.5).floor() as i64,
                (z + 0.5).floor() as i64,
            ),
            FilterMode::Linear => self.trilinear(x, y, z),
        }
    }

    fn trilinear(&self, x: f32, y: f32, z: f32) -> f32 {
        let (x0, fx) = split(x);
        let (y0, fy) = split(y);
        let (z0, fz) = split(z);

        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
        let plane = |z: i64| {
            let bottom = lerp(self.fetch(x0, y0, z), self.fetch(x0 + 1, y0, z), fx);
            let top = lerp(self.fetch(x0, y0 + 1, z), self.fetch(x0 + 1, y0 + 1, z), fx);
            lerp(bottom, top, fy)
        };
        lerp(plane(z0), plane(z0 + 1), fz)
    }
}

fn split(v: f32) -> (i64, f32) {
    let base = v.floor();
    (base as i64, v - base)
}

fn clamp_index(i: i64, len: usize) -> usize {
    i.clamp(0, len.saturating_sub(1) as i64) as usize
}
