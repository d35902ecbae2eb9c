//! Sky geometry: Lambert projections and pencil beams
//!
//! The footprint is tiled in two Lambert azimuthal equal-area projections,
//! one centred on each galactic pole. A hemisphere maps onto the disk
//! `x² + y² ≤ 2`, and equal projected areas are equal solid angles, so a
//! square pixel of side `dx` covers `dx²` steradians wherever it lies.

use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

use glam::DVec3;
use skygen_backends::{DeviceArena, DualResidencyHandle, Extent};

use crate::error::{Result, SkygenError};

/// Squared radius of one projected hemisphere.
pub const HEMISPHERE_R2: f64 = 2.0;

/// Lambert azimuthal equal-area projection about a pole `(l0, b0)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertProjection {
    l0: f64,
    sin_b0: f64,
    cos_b0: f64,
}

impl LambertProjection {
    /// Projection centred on `(l0, b0)`, in radians.
    pub fn new(l0: f64, b0: f64) -> Self {
        Self {
            l0,
            sin_b0: b0.sin(),
            cos_b0: b0.cos(),
        }
    }

    pub fn north() -> Self {
        Self::new(FRAC_PI_2, FRAC_PI_2)
    }

    pub fn south() -> Self {
        Self::new(-FRAC_PI_2, -FRAC_PI_2)
    }

    /// Sky position in radians to projected `(x, y)`.
    pub fn project(&self, l: f64, b: f64) -> (f64, f64) {
        let (sin_b, cos_b) = b.sin_cos();
        let (sin_dl, cos_dl) = (l - self.l0).sin_cos();
        let cos_c = self.sin_b0 * sin_b + self.cos_b0 * cos_b * cos_dl;
        let k = (2.0 / (1.0 + cos_c)).sqrt();
        (
            k * cos_b * sin_dl,
            k * (self.cos_b0 * sin_b - self.sin_b0 * cos_b * cos_dl),
        )
    }

    /// Projected `(x, y)` back to `(l, b)` in radians, `l` in `[0, 2π)`.
    pub fn deproject(&self, x: f64, y: f64) -> (f64, f64) {
        let r = x.hypot(y);
        if r == 0.0 {
            return (self.l0.rem_euclid(2.0 * PI), self.sin_b0.asin());
        }
        let c = 2.0 * (r / 2.0).min(1.0).asin();
        let (sin_c, cos_c) = c.sin_cos();
        let b = (cos_c * self.sin_b0 + y * sin_c * self.cos_b0 / r).clamp(-1.0, 1.0).asin();
        let l = self.l0 + (x * sin_c).atan2(r * self.cos_b0 * cos_c - y * self.sin_b0 * sin_c);
        (l.rem_euclid(2.0 * PI), b)
    }
}

/// Unit direction on the sky, kept as sines and cosines.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Direction {
    pub cos_l: f64,
    pub sin_l: f64,
    pub cos_b: f64,
    pub sin_b: f64,
}

impl Direction {
    pub fn new(l: f64, b: f64) -> Self {
        let (sin_l, cos_l) = l.sin_cos();
        let (sin_b, cos_b) = b.sin_cos();
        Self {
            cos_l,
            sin_l,
            cos_b,
            sin_b,
        }
    }

    /// Galactocentric position of a point `distance` parsecs along this
    /// direction, for the Sun at `(sun_distance, 0, 0)`.
    pub fn xyz(&self, distance: f64, sun_distance: f64) -> DVec3 {
        DVec3::new(
            sun_distance - distance * self.cos_l * self.cos_b,
            -distance * self.sin_l * self.cos_b,
            distance * self.sin_b,
        )
    }
}

/// One footprint pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PencilBeam {
    /// Hemisphere: 0 north, 1 south
    pub proj_idx: u32,
    /// Projected centre
    pub x: f64,
    pub y: f64,
    /// Projected side length
    pub dx: f64,
    /// Solid angle, `dx²`
    pub d_a: f64,
    /// Fraction of the pixel inside the survey footprint
    pub coverage: f64,
    /// Row in the per-beam extinction table
    pub ext_idx: u32,
    pub direction: Direction,
}

impl PencilBeam {
    pub fn new(
        projection: &LambertProjection,
        proj_idx: u32,
        x: f64,
        y: f64,
        dx: f64,
        coverage: f64,
        ext_idx: u32,
    ) -> Self {
        let (l, b) = projection.deproject(x, y);
        Self {
            proj_idx,
            x,
            y,
            dx,
            d_a: dx * dx,
            coverage,
            ext_idx,
            direction: Direction::new(l, b),
        }
    }
}

/// The footprint's pixels plus the projections they were laid out in.
#[derive(Debug, Clone)]
pub struct Footprint {
    beams: DualResidencyHandle<PencilBeam>,
    projections: [LambertProjection; 2],
}

impl Footprint {
    pub fn new(beams: &[PencilBeam], device: Option<Arc<DeviceArena>>) -> Result<Self> {
        Self::with_projections(beams, [LambertProjection::north(), LambertProjection::south()], device)
    }

    pub fn with_projections(
        beams: &[PencilBeam],
        projections: [LambertProjection; 2],
        device: Option<Arc<DeviceArena>>,
    ) -> Result<Self> {
        if beams.is_empty() {
            return Err(SkygenError::EmptyFootprint);
        }
        let beams = DualResidencyHandle::from_host(Extent::d1(beams.len()), beams, device)?;
        Ok(Self { beams, projections })
    }

    /// Square pixels of side `dx` tiling the cap within `radius` (radians)
    /// of a pole. Each pixel's coverage is the fraction of a 4×4 subgrid of
    /// its area that falls inside the cap.
    pub fn polar_cap(
        proj_idx: u32,
        radius: f64,
        dx: f64,
        device: Option<Arc<DeviceArena>>,
    ) -> Result<Self> {
        const SUB: usize = 4;
        let projections = [LambertProjection::north(), LambertProjection::south()];
        let projection = projections
            .get(proj_idx as usize)
            .ok_or_else(|| SkygenError::Config(format!("no hemisphere with index {proj_idx}")))?;
        if !(dx > 0.0) {
            return Err(SkygenError::Config(format!("pixel size must be positive, got {dx}")));
        }

        // projected radius of a cap of angular radius `radius`
        let r_cap = 2.0 * (radius.min(FRAC_PI_2) / 2.0).sin();
        let n = (r_cap / dx).ceil() as i64;
        let mut beams = Vec::new();
        for iy in -n..n {
            for ix in -n..n {
                let (x, y) = ((ix as f64 + 0.5) * dx, (iy as f64 + 0.5) * dx);
                let inside = (0..SUB * SUB)
                    .filter(|s| {
                        let sx = x + dx * (((s % SUB) as f64 + 0.5) / SUB as f64 - 0.5);
                        let sy = y + dx * (((s / SUB) as f64 + 0.5) / SUB as f64 - 0.5);
                        sx * sx + sy * sy <= r_cap * r_cap
                    })
                    .count();
                if inside > 0 {
                    let coverage = inside as f64 / (SUB * SUB) as f64;
                    let ext_idx = beams.len() as u32;
                    beams.push(PencilBeam::new(projection, proj_idx, x, y, dx, coverage, ext_idx));
                }
            }
        }
        Self::with_projections(&beams, projections, device)
    }

    /// Same pixels in a handle backed by `device`.
    pub fn on_device(&self, device: Option<Arc<DeviceArena>>) -> Result<Self> {
        Self::with_projections(&self.beams.to_vec()?, self.projections, device)
    }

    pub fn beams(&self) -> &DualResidencyHandle<PencilBeam> {
        &self.beams
    }

    pub fn projections(&self) -> &[LambertProjection; 2] {
        &self.projections
    }

    pub fn len(&self) -> usize {
        self.beams.extent().elements()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total solid angle weighted by coverage.
    pub fn area(&self) -> Result<f64> {
        Ok(self.beams.to_vec()?.iter().map(|b| b.d_a * b.coverage).sum())
    }
}

// ============================================================================
// Tests
// ============================================================================
