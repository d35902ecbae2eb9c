//! Extinction fields
//!
//! Extinction is looked up by projected position and distance modulus in a
//! per-hemisphere 3D grid. The grids are held in [`DualResidencyHandle`]s and
//! sampled through linear array bindings taken once per pass, so the device
//! copies stay bound (and safe from garbage collection) while lanes run.
//!
//! An optional per-beam table holds extinction along each pencil beam's
//! centre as a function of distance modulus; the sampler caches its value per
//! diagonal. Without it the beam value falls back to a grid lookup at the
//! beam centre.

use std::sync::Arc;

use skygen_backends::{ArrayBinding, ArrayFormat, DeviceArena, DualResidencyHandle, Extent};

use crate::error::{Result, SkygenError};
use crate::pixel::PencilBeam;

/// Distance modulus standing in for infinite distance.
pub const DM_INFINITY: f64 = 100.0;

/// Extinction lookup as seen by lanes.
pub trait ExtinctionField: Send + Sync {
    /// Extinction at projected `(x, y)` in hemisphere `proj_idx` and distance
    /// modulus `dm`.
    fn sample(&self, proj_idx: u32, x: f64, y: f64, dm: f64) -> f64;

    /// Extinction along the centre of `beam` at distance modulus `dm`.
    fn along_beam(&self, beam: &PencilBeam, dm: f64) -> f64 {
        self.sample(beam.proj_idx, beam.x, beam.y, dm)
    }
}

/// Something that can hand lanes an [`ExtinctionField`] for one pass.
pub trait ExtinctionSource {
    type Field: ExtinctionField;

    fn bind(&self) -> Result<Self::Field>;
}

/// Transparent sky.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtinction;

impl ExtinctionField for NoExtinction {
    fn sample(&self, _proj_idx: u32, _x: f64, _y: f64, _dm: f64) -> f64 {
        0.0
    }
}

impl ExtinctionSource for NoExtinction {
    type Field = NoExtinction;

    fn bind(&self) -> Result<NoExtinction> {
        Ok(NoExtinction)
    }
}

/// Affine map from a physical coordinate to array index space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    /// Coordinate of element 0
    pub origin: f64,
    /// Coordinate distance between neighbouring elements
    pub step: f64,
}

impl Axis {
    pub fn new(origin: f64, step: f64) -> Self {
        Self { origin, step }
    }

    #[inline]
    pub fn index(&self, value: f64) -> f32 {
        ((value - self.origin) / self.step) as f32
    }

    pub fn value(&self, index: usize) -> f64 {
        self.origin + self.step * index as f64
    }
}

/// One hemisphere's extinction over (x, y, DM).
#[derive(Debug, Clone)]
pub struct ExtinctionGrid {
    values: DualResidencyHandle<f32>,
    axes: [Axis; 3],
}

impl ExtinctionGrid {
    /// Grid over `extent` (x, y, DM) from dense x-fastest values.
    pub fn new(extent: Extent, values: &[f32], axes: [Axis; 3], device: Option<Arc<DeviceArena>>) -> Result<Self> {
        for axis in &axes {
            if !(axis.step > 0.0) {
                return Err(SkygenError::Config(format!("extinction axis step must be positive, got {}", axis.step)));
            }
        }
        let values = DualResidencyHandle::from_host(extent, values, device)?;
        Ok(Self { values, axes })
    }

    /// Grid filled by evaluating `f(x, y, dm)` at every element.
    pub fn from_fn(
        extent: Extent,
        axes: [Axis; 3],
        device: Option<Arc<DeviceArena>>,
        f: impl Fn(f64, f64, f64) -> f32,
    ) -> Result<Self> {
        let mut values = Vec::with_capacity(extent.elements());
        for iz in 0..extent.depth {
            for iy in 0..extent.height {
                for ix in 0..extent.width {
                    values.push(f(axes[0].value(ix), axes[1].value(iy), axes[2].value(iz)));
                }
            }
        }
        Self::new(extent, &values, axes, device)
    }

    pub fn handle(&self) -> &DualResidencyHandle<f32> {
        &self.values
    }

    fn bind(&self) -> Result<BoundGrid> {
        Ok(BoundGrid {
            array: self.values.bind_array(ArrayFormat::LINEAR)?,
            axes: self.axes,
        })
    }
}

/// Extinction along each beam centre, one row per beam.
#[derive(Debug, Clone)]
pub struct BeamExtinctionTable {
    values: DualResidencyHandle<f32>,
    dm_axis: Axis,
}

impl BeamExtinctionTable {
    /// `values` holds `beams` rows of `dm_samples` values each.
    pub fn new(
        dm_samples: usize,
        beams: usize,
        values: &[f32],
        dm_axis: Axis,
        device: Option<Arc<DeviceArena>>,
    ) -> Result<Self> {
        let values = DualResidencyHandle::from_host(Extent::d2(dm_samples, beams), values, device)?;
        Ok(Self { values, dm_axis })
    }

    /// Table tabulated from a bound field at each beam's centre.
    pub fn tabulate(
        field: &impl ExtinctionField,
        beams: &[PencilBeam],
        dm_axis: Axis,
        dm_samples: usize,
        device: Option<Arc<DeviceArena>>,
    ) -> Result<Self> {
        let mut values = vec![0.0f32; dm_samples * beams.len()];
        for beam in beams {
            let row = beam.ext_idx as usize * dm_samples;
            let Some(row) = values.get_mut(row..row + dm_samples) else {
                return Err(SkygenError::Config(format!(
                    "beam extinction index {} outside a table of {} rows",
                    beam.ext_idx,
                    beams.len()
                )));
            };
            for (i, slot) in row.iter_mut().enumerate() {
                *slot = field.along_beam(beam, dm_axis.value(i)) as f32;
            }
        }
        Self::new(dm_samples, beams.len(), &values, dm_axis, device)
    }
}

/// North and south grids with an optional per-beam table.
#[derive(Debug, Clone)]
pub struct ExtinctionMaps {
    hemispheres: [ExtinctionGrid; 2],
    beams: Option<BeamExtinctionTable>,
}

impl ExtinctionMaps {
    pub fn new(north: ExtinctionGrid, south: ExtinctionGrid) -> Self {
        Self {
            hemispheres: [north, south],
            beams: None,
        }
    }

    pub fn with_beam_table(mut self, table: BeamExtinctionTable) -> Self {
        self.beams = Some(table);
        self
    }

    pub fn hemisphere(&self, proj_idx: u32) -> Option<&ExtinctionGrid> {
        self.hemispheres.get(proj_idx as usize)
    }
}

impl ExtinctionSource for ExtinctionMaps {
    type Field = BoundExtinction;

    #[tracing::instrument(skip_all, fields(beam_table = self.beams.is_some()))]
    fn bind(&self) -> Result<BoundExtinction> {
        let [north, south] = &self.hemispheres;
        let beams = match &self.beams {
            Some(table) => Some((table.values.bind_array(ArrayFormat::POINT)?, table.dm_axis)),
            None => None,
        };
        Ok(BoundExtinction {
            hemispheres: [north.bind()?, south.bind()?],
            beams,
        })
    }
}

#[derive(Clone)]
struct BoundGrid {
    array: ArrayBinding<f32>,
    axes: [Axis; 3],
}

impl BoundGrid {
    #[inline]
    fn sample(&self, x: f64, y: f64, dm: f64) -> f64 {
        let [ax, ay, adm] = &self.axes;
        f64::from(self.array.sample(ax.index(x), ay.index(y), adm.index(dm)))
    }
}

/// Extinction maps bound for the duration of a pass.
#[derive(Clone)]
pub struct BoundExtinction {
    hemispheres: [BoundGrid; 2],
    beams: Option<(ArrayBinding<f32>, Axis)>,
}

impl ExtinctionField for BoundExtinction {
    #[inline]
    fn sample(&self, proj_idx: u32, x: f64, y: f64, dm: f64) -> f64 {
        let grid = &self.hemispheres[(proj_idx as usize).min(1)];
        grid.sample(x, y, dm)
    }

    fn along_beam(&self, beam: &PencilBeam, dm: f64) -> f64 {
        match &self.beams {
            Some((table, axis)) => f64::from(table.sample(axis.index(dm), beam.ext_idx as f32, 0.0)),
            None => self.sample(beam.proj_idx, beam.x, beam.y, dm),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
