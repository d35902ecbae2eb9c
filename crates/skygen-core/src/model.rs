//! Density model interface
//!
//! The sampler is generic over the model, so density evaluation in the hot
//! per-cell loop is statically dispatched. A model keeps whatever it needs
//! per position in its [`DensityModel::State`], which lives in the lane's
//! checkpoint and is recomputed only when the distance bin changes.

use glam::DVec3;

use crate::rng::LaneRng;

pub trait DensityModel: Send + Sync {
    /// Per-lane cached state for the current position.
    type State: Copy + Default + Send + Sync + 'static;

    /// Scratch bytes one lane needs for this model. Checked against the
    /// per-group budget when the launch is planned.
    fn scratch_bytes_per_lane(&self) -> usize {
        std::mem::size_of::<Self::State>()
    }

    /// Prepare `state` for galactocentric position `pos` in parsecs.
    fn setpos(&self, state: &mut Self::State, pos: DVec3);

    /// Stars per cubic parsec per unit absolute magnitude at the position
    /// last passed to [`DensityModel::setpos`].
    fn density(&self, state: &Self::State, abs_mag: f64) -> f64;

    /// Component a star at `pos` with absolute magnitude `abs_mag` belongs to.
    fn component(&self, state: &Self::State, pos: DVec3, abs_mag: f64, rng: &mut LaneRng) -> u32;
}

/// Constant density in space and absolute magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homogeneous {
    pub rho: f64,
    pub component: u32,
}

impl Homogeneous {
    pub fn new(rho: f64) -> Self {
        Self { rho, component: 0 }
    }
}

impl DensityModel for Homogeneous {
    type State = ();

    fn setpos(&self, _state: &mut (), _pos: DVec3) {}

    fn density(&self, _state: &(), _abs_mag: f64) -> f64 {
        self.rho
    }

    fn component(&self, _state: &(), _pos: DVec3, _abs_mag: f64, _rng: &mut LaneRng) -> u32 {
        self.component
    }
}
