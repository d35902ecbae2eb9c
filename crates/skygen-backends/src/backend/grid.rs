//! Launch-shape planning
//!
//! Turns a requested lane count into a grid of fixed-size groups. Each group
//! owns a scratch budget; a lane needs `scratch_per_lane` bytes of it on top
//! of the group's static reservation, which caps the group size. The group
//! count is then laid out as a two-dimensional grid whose extents stay under
//! [`MAX_GRID_EXTENT`], choosing the factorization that wastes the fewest
//! padding lanes.

use super::types::{BlockDim, GridDim, LaunchConfig, ScratchConfig};

/// Largest extent of one grid dimension.
pub const MAX_GRID_EXTENT: u32 = 65_535;

/// Default lanes per group.
pub const DEFAULT_GROUP_SIZE: u32 = 192;

/// Default per-group scratch budget in bytes.
pub const DEFAULT_SCRATCH_BUDGET: usize = 16_384;

/// Default static scratch reserved by each group before any lane's share.
pub const DEFAULT_STATIC_SCRATCH: usize = 96;

/// What a caller wants to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Lanes doing real work
    pub lanes: u64,
    /// Preferred lanes per group
    pub group_size: u32,
    /// Scratch bytes one lane needs
    pub scratch_per_lane: usize,
    /// Scratch bytes reserved per group regardless of size
    pub static_scratch: usize,
    /// Scratch bytes available to a group
    pub scratch_budget: usize,
}

impl LaunchRequest {
    pub fn new(lanes: u64) -> Self {
        Self {
            lanes,
            group_size: DEFAULT_GROUP_SIZE,
            scratch_per_lane: 0,
            static_scratch: DEFAULT_STATIC_SCRATCH,
            scratch_budget: DEFAULT_SCRATCH_BUDGET,
        }
    }

    pub fn with_group_size(mut self, group_size: u32) -> Self {
        self.group_size = group_size;
        self
    }

    pub fn with_scratch(mut self, per_lane: usize, static_bytes: usize, budget: usize) -> Self {
        self.scratch_per_lane = per_lane;
        self.static_scratch = static_bytes;
        self.scratch_budget = budget;
        self
    }

    /// Largest group the scratch budget admits, capped at `group_size`.
    /// `None` when not even one lane fits.
    pub fn admissible_group_size(&self) -> Option<u32> {
        let one_lane = self.static_scratch.checked_add(self.scratch_per_lane)?;
        if one_lane > self.scratch_budget || self.group_size == 0 {
            return None;
        }
        let fit = match self.scratch_per_lane {
            0 => self.group_size as usize,
            per_lane => (self.scratch_budget - self.static_scratch) / per_lane,
        };
        Some(fit.min(self.group_size as usize) as u32)
    }
}

/// Plan a launch for `request`.
///
/// Returns `None` only when a single lane's scratch share plus the group's
/// static reservation exceeds the budget, or when the lane count is too
/// large for any grid.
pub fn plan_launch(request: &LaunchRequest) -> Option<LaunchConfig> {
    let group = request.admissible_group_size()?;
    let lanes = request.lanes.max(1);
    let blocks = lanes.div_ceil(group as u64);
    let (bx, by) = factorize_blocks(blocks)?;

    Some(LaunchConfig::new(
        GridDim::plane(bx, by),
        BlockDim::linear(group),
        ScratchConfig::new(request.static_scratch + group as usize * request.scratch_per_lane),
    ))
}

/// Lay `blocks` out as `bx × by ≥ blocks` with both extents at most
/// [`MAX_GRID_EXTENT`], minimizing `bx·by − blocks`.
pub fn factorize_blocks(blocks: u64) -> Option<(u32, u32)> {
    let max = MAX_GRID_EXTENT as u64;
    if blocks <= max {
        return Some((blocks.max(1) as u32, 1));
    }
    if blocks > max * max {
        return None;
    }

    let mut best: Option<(u64, u64, u64)> = None;
    for by in blocks.div_ceil(max)..=max {
        let bx = blocks.div_ceil(by);
        if bx > max {
            continue;
        }
        let waste = bx * by - blocks;
        if best.is_none_or(|(_, _, w)| waste < w) {
            best = Some((bx, by, waste));
            if waste == 0 {
                break;
            }
        }
        // Past the square root every remaining pair is a transposition.
        if by > bx {
            break;
        }
    }
    best.map(|(bx, by, _)| (bx as u32, by as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousand_lanes_with_default_group() {
        let config = plan_launch(&LaunchRequest::new(1000)).unwrap();
        assert_eq!(config.block.x, 192);
        assert_eq!(config.grid, GridDim::plane(6, 1));
        assert_eq!(config.total_lanes(), 1152);
        assert_eq!(config.scratch.size_bytes, DEFAULT_STATIC_SCRATCH);
    }

    #[test]
    fn budget_shrinks_group() {
        // (16384 - 96) / 160 = 101 lanes per group
        let request = LaunchRequest::new(1000).with_scratch(160, 96, 16_384);
        let config = plan_launch(&request).unwrap();
        assert_eq!(config.block.x, 101);
        assert_eq!(config.grid.total_blocks(), 10);
        assert!(config.total_lanes() >= 1000);
        assert!(config.scratch.size_bytes <= 16_384);
    }

    #[test]
    fn fails_only_when_one_lane_does_not_fit() {
        let exact = LaunchRequest::new(10).with_scratch(16_288, 96, 16_384);
        assert_eq!(plan_launch(&exact).unwrap().block.x, 1);

        let over = LaunchRequest::new(10).with_scratch(16_289, 96, 16_384);
        assert!(plan_launch(&over).is_none());
    }

    #[test]
    fn large_counts_use_two_dimensions() {
        let (bx, by) = factorize_blocks(65_536).unwrap();
        assert!(bx <= MAX_GRID_EXTENT && by <= MAX_GRID_EXTENT);
        assert_eq!(bx as u64 * by as u64, 65_536);

        let (bx, by) = factorize_blocks(70_001).unwrap();
        assert!(bx as u64 * by as u64 >= 70_001);
        assert!(bx as u64 * by as u64 - 70_001 < by as u64);
    }

    #[test]
    fn zero_lanes_still_yields_a_group() {
        let config = plan_launch(&LaunchRequest::new(0)).unwrap();
        assert_eq!(config.grid.total_blocks(), 1);
    }
}
