//! Launch shapes, lane contexts and residency sides

use std::fmt;

/// Where a piece of memory lives, or where a harness runs its lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Host,
    Device,
}

impl Side {
    /// The other side.
    pub const fn opposite(self) -> Self {
        match self {
            Side::Host => Side::Device,
            Side::Device => Side::Host,
        }
    }

    /// Transfer direction label when copying *into* this side.
    pub const fn inbound_direction(self) -> &'static str {
        match self {
            Side::Host => "D2H",
            Side::Device => "H2D",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Host => f.write_str("host"),
            Side::Device => f.write_str("device"),
        }
    }
}

/// Grid dimensions: the arrangement of lane groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridDim {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GridDim {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub const fn linear(size: u32) -> Self {
        Self { x: size, y: 1, z: 1 }
    }

    pub const fn plane(x: u32, y: u32) -> Self {
        Self { x, y, z: 1 }
    }

    /// Total number of groups
    pub const fn total_blocks(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl Default for GridDim {
    fn default() -> Self {
        Self { x: 1, y: 1, z: 1 }
    }
}

impl fmt::Display for GridDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Lanes per group. Groups are one-dimensional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockDim {
    pub x: u32,
}

impl BlockDim {
    pub const fn linear(size: u32) -> Self {
        Self { x: size }
    }

    pub const fn total_lanes(&self) -> u32 {
        self.x
    }
}

impl Default for BlockDim {
    fn default() -> Self {
        Self { x: 1 }
    }
}

/// Per-group scratch memory reserved by a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScratchConfig {
    /// Bytes per group, static part plus every lane's share
    pub size_bytes: usize,
}

impl ScratchConfig {
    pub const fn new(size_bytes: usize) -> Self {
        Self { size_bytes }
    }

    pub const fn none() -> Self {
        Self { size_bytes: 0 }
    }
}

/// Launch configuration: grid × group plus scratch requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchConfig {
    pub grid: GridDim,
    pub block: BlockDim,
    pub scratch: ScratchConfig,
}

impl LaunchConfig {
    pub const fn new(grid: GridDim, block: BlockDim, scratch: ScratchConfig) -> Self {
        Self { grid, block, scratch }
    }

    /// Simple 1D configuration covering `total_lanes` lanes.
    pub const fn linear(total_lanes: u32, group_size: u32) -> Self {
        Self {
            grid: GridDim::linear(total_lanes.div_ceil(group_size)),
            block: BlockDim::linear(group_size),
            scratch: ScratchConfig::none(),
        }
    }

    pub const fn total_blocks(&self) -> u64 {
        self.grid.total_blocks()
    }

    /// Lane capacity of the shape, including padding lanes.
    pub const fn total_lanes(&self) -> u64 {
        self.grid.total_blocks() * self.block.total_lanes() as u64
    }

    /// Context for the lane with the given global index.
    pub fn lane_context(&self, global: u64, active_lanes: u64) -> LaneContext {
        let group = self.block.x as u64;
        let block_linear = global / group;
        let gx = self.grid.x as u64;
        let gxy = gx * self.grid.y as u64;
        LaneContext {
            block_idx: (
                (block_linear % gx) as u32,
                ((block_linear % gxy) / gx) as u32,
                (block_linear / gxy) as u32,
            ),
            lane_idx: (global % group) as u32,
            grid_dim: self.grid,
            block_dim: self.block,
            active_lanes,
        }
    }
}

impl fmt::Display for LaunchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "grid={}, block={}, scratch={}B",
            self.grid, self.block.x, self.scratch.size_bytes
        )
    }
}

/// Positional information handed to every invocation of a lane body.
///
/// This is passed explicitly instead of living in shared "current lane"
/// registers, so the same body runs unchanged on any harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneContext {
    /// Group index within the grid
    pub block_idx: (u32, u32, u32),
    /// Lane index within the group
    pub lane_idx: u32,
    pub grid_dim: GridDim,
    pub block_dim: BlockDim,
    /// Number of lanes doing real work in this launch
    pub active_lanes: u64,
}

impl LaneContext {
    pub const fn block_linear_index(&self) -> u64 {
        let (bx, by, bz) = self.block_idx;
        (bz as u64 * self.grid_dim.y as u64 + by as u64) * self.grid_dim.x as u64 + bx as u64
    }

    /// Global lane id, `((bz·gy + by)·gx + bx)·groupSize + lane`.
    pub const fn global_lane_index(&self) -> u64 {
        self.block_linear_index() * self.block_dim.x as u64 + self.lane_idx as u64
    }

    pub const fn is_active(&self) -> bool {
        self.global_lane_index() < self.active_lanes
    }
}

// ================================================================================================
// Tests
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_dim() {
        let grid = GridDim::new(2, 3, 4);
        assert_eq!(grid.total_blocks(), 24);
        assert_eq!(grid.to_string(), "(2, 3, 4)");
        assert_eq!(GridDim::plane(4, 4).total_blocks(), 16);
    }

    #[test]
    fn test_linear_config() {
        let config = LaunchConfig::linear(1000, 192);
        assert_eq!(config.grid, GridDim::linear(6));
        assert_eq!(config.total_lanes(), 1152);
    }

    #[test]
    fn test_lane_context_round_trips_global_index() {
        let config = LaunchConfig::new(GridDim::plane(3, 2), BlockDim::linear(4), ScratchConfig::none());
        for global in 0..config.total_lanes() {
            let ctx = config.lane_context(global, 20);
            assert_eq!(ctx.global_lane_index(), global);
            assert_eq!(ctx.is_active(), global < 20);
        }
        let ctx = config.lane_context(13, 20);
        assert_eq!(ctx.block_idx, (0, 1, 0));
        assert_eq!(ctx.lane_idx, 1);
    }

    #[test]
    fn test_side() {
        assert_eq!(Side::Host.opposite(), Side::Device);
        assert_eq!(Side::Device.inbound_direction(), "H2D");
        assert_eq!(Side::Host.to_string(), "host");
    }
}
