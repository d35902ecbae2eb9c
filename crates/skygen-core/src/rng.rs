//! Per-lane random streams
//!
//! Every lane owns one multiply-with-carry generator. The generators live in
//! a [`StreamPool`], a flat array of three-word states backed by a
//! [`DualResidencyHandle`], so the whole pool moves between host and device
//! in one bulk transfer. A lane copies its state into a [`LaneRng`] at the
//! start of a launch and writes it back at the end:
//!
//! ```text
//!   StreamPool (host or device)          lane scratch
//!   ┌──────┬──────┬──────┬─────┐
//!   │ s[0] │ s[1] │ s[2] │ ... │ ──load──►  LaneRng ──uniform()/gaussian()/poisson()
//!   └──────┴──────┴──────┴─────┘ ◄─store──
//! ```
//!
//! The recurrence is `t = a·x + c; x = t mod 2³²; c = t / 2³²` with `a`
//! taken from a table of multipliers for which `a·2³² − 1` is prime. Streams
//! are decorrelated by their seeds, drawn from a ChaCha generator.

use bytemuck::{Pod, Zeroable};
use parking_lot::MappedRwLockWriteGuard;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};
use skygen_backends::{DeviceArena, DualResidencyHandle, Extent, Side};
use std::sync::Arc;

use crate::error::{Result, SkygenError};

/// Streams generated when the configuration does not say otherwise.
pub const DEFAULT_STREAMS: usize = 1 << 16;

const MULTIPLIERS: [u32; 8] = [
    4294957665, 4294963023, 3947008974, 3874257210, 2936881968, 2811536238, 2654432763, 1640531364,
];

/// 2⁻²⁴
const UNIFORM_SCALE: f32 = 1.0 / 16_777_216.0;

/// One multiply-with-carry generator state.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct MwcState {
    pub multiplier: u32,
    pub carry: u32,
    pub x: u32,
}

impl MwcState {
    /// A state is usable when its carry is below the multiplier and the
    /// pair is not one of the recurrence's fixed points.
    pub fn is_valid(&self) -> bool {
        self.multiplier != 0 && self.carry < self.multiplier && !(self.carry == 0 && self.x == 0)
    }
}

/// Flat pool of generator states, one per lane.
#[derive(Debug, Clone)]
pub struct StreamPool {
    states: DualResidencyHandle<MwcState>,
}

impl StreamPool {
    /// Seed `streams` independent generators from `seed`.
    pub fn seeded(streams: usize, seed: u64, device: Option<Arc<DeviceArena>>) -> Result<Self> {
        let mut seeder = ChaCha8Rng::seed_from_u64(seed);
        let states: Vec<MwcState> = (0..streams)
            .map(|i| {
                let multiplier = MULTIPLIERS[i % MULTIPLIERS.len()];
                MwcState {
                    multiplier,
                    carry: seeder.gen_range(1..multiplier),
                    x: seeder.gen(),
                }
            })
            .collect();
        Self::from_states(&states, device)
    }

    pub fn from_states(states: &[MwcState], device: Option<Arc<DeviceArena>>) -> Result<Self> {
        let states = DualResidencyHandle::from_host(Extent::d1(states.len()), states, device)?;
        Ok(Self { states })
    }

    /// Rebuild a pool from its packed word representation
    /// (`multiplier, carry, x` per stream).
    pub fn from_words(words: &[u32], device: Option<Arc<DeviceArena>>) -> Result<Self> {
        if words.len() % 3 != 0 {
            return Err(SkygenError::Config(format!(
                "stream pool needs a multiple of 3 words, got {}",
                words.len()
            )));
        }
        let states: &[MwcState] =
            bytemuck::try_cast_slice(words).map_err(|err| SkygenError::Config(format!("stream pool words: {err}")))?;
        Self::from_states(states, device)
    }

    /// Packed words of every stream, read from wherever the pool is
    /// authoritative.
    pub fn to_words(&self) -> Result<Vec<u32>> {
        let states = self.states.to_vec()?;
        Ok(bytemuck::cast_slice(&states).to_vec())
    }

    pub fn len(&self) -> usize {
        self.states.extent().elements()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn handle(&self) -> &DualResidencyHandle<MwcState> {
        &self.states
    }

    /// Fails if `lanes` lanes cannot each get a stream of their own.
    pub fn check_lanes(&self, lanes: usize) -> Result<()> {
        if lanes > self.len() {
            return Err(SkygenError::StreamPoolExhausted {
                lanes,
                streams: self.len(),
            });
        }
        Ok(())
    }

    /// Writable states of lanes `0..lanes` on `side`.
    pub fn lane_states(&self, lanes: usize, side: Side) -> Result<MappedRwLockWriteGuard<'_, [MwcState]>> {
        self.check_lanes(lanes)?;
        let guard = self.states.write_on(side)?;
        Ok(MappedRwLockWriteGuard::map(guard, |states| &mut states[..lanes]))
    }
}

/// A lane's private copy of its generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneRng {
    state: MwcState,
}

impl LaneRng {
    pub fn new(state: MwcState) -> Self {
        Self { state }
    }

    /// Copy `lane`'s state out of its pool slot. Slots come from
    /// [`StreamPool::lane_states`], which has already checked the lane
    /// count; a slot that never held a seeded generator is rejected here.
    pub fn load(slot: &MwcState, lane: u64) -> Result<Self> {
        if !slot.is_valid() {
            return Err(SkygenError::InvalidStream {
                lane,
                multiplier: slot.multiplier,
                carry: slot.carry,
            });
        }
        Ok(Self::new(*slot))
    }

    /// Write the advanced state back into its pool slot.
    pub fn store(&self, slot: &mut MwcState) {
        *slot = self.state;
    }

    pub fn state(&self) -> MwcState {
        self.state
    }

    #[inline]
    fn step(&mut self) -> u32 {
        let t = u64::from(self.state.multiplier) * u64::from(self.state.x) + u64::from(self.state.carry);
        self.state.carry = (t >> 32) as u32;
        self.state.x = t as u32;
        self.state.x
    }

    /// Uniform variate in `[0, 1)`.
    #[inline]
    pub fn uniform(&mut self) -> f32 {
        (self.step() >> 8) as f32 * UNIFORM_SCALE
    }

    /// Uniform variate in `(0, 1)`.
    #[inline]
    pub fn uniform_pos(&mut self) -> f32 {
        loop {
            let u = self.uniform();
            if u > 0.0 {
                return u;
            }
        }
    }

    /// Gaussian variate with zero mean, by the polar method.
    pub fn gaussian(&mut self, sigma: f64) -> f64 {
        loop {
            let x = -1.0 + 2.0 * f64::from(self.uniform_pos());
            let y = -1.0 + 2.0 * f64::from(self.uniform_pos());
            let r2 = x * x + y * y;
            if r2 > 1.0 || r2 == 0.0 {
                continue;
            }
            return sigma * y * (-2.0 * r2.ln() / r2).sqrt();
        }
    }

    /// Poisson variate with mean `mu`; zero for a non-positive or
    /// non-finite mean.
    pub fn poisson(&mut self, mu: f64) -> u64 {
        match Poisson::new(mu) {
            Ok(poisson) => poisson.sample(self) as u64,
            Err(_) => 0,
        }
    }
}

impl RngCore for LaneRng {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.step()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let lo = u64::from(self.step());
        let hi = u64::from(self.step());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let word = self.step().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
