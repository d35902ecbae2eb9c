//! Per-lane resumption state
//!
//! A lane that stops mid-pass writes down exactly where it was: its traversal
//! position, the cell values cached for the current diagonal, the model
//! state, and how many draws of the current cell it still owes. The next
//! launch picks up from there. Checkpoints live in a
//! [`DualResidencyHandle`] so they stay on whichever side the lanes run.

use std::sync::Arc;

use glam::DVec3;
use parking_lot::MappedRwLockWriteGuard;
use skygen_backends::{DeviceArena, DualResidencyHandle, Extent, Side};

use crate::error::Result;
use crate::traversal::WalkPosition;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LaneStatus {
    /// No work done yet in this pass
    #[default]
    Fresh,
    /// Stopped with work left
    Suspended,
    /// Visited its whole range and owes no draws
    Finished,
}

/// Values shared by every cell of one diagonal of one pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellCache {
    /// Distance in parsecs
    pub distance: f64,
    /// Extinction along the beam at this distance
    pub extinction: f64,
    pub position: DVec3,
    /// Outside the configured distance limits; every cell of the diagonal is
    /// skipped
    pub excluded: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LaneCheckpoint<S> {
    pub status: LaneStatus,
    pub position: WalkPosition,
    pub cache: CellCache,
    pub model_state: S,
    /// Draws of the current cell not yet written
    pub pending: u64,
}

impl<S> LaneCheckpoint<S> {
    pub fn is_continuing(&self) -> bool {
        self.status != LaneStatus::Finished
    }
}

/// Checkpoints of every lane.
#[derive(Debug, Clone)]
pub struct CheckpointStore<S: Copy + Default + Send + Sync + 'static> {
    states: DualResidencyHandle<LaneCheckpoint<S>>,
}

impl<S: Copy + Default + Send + Sync + 'static> CheckpointStore<S> {
    pub fn new(lanes: usize, device: Option<Arc<DeviceArena>>) -> Result<Self> {
        let fresh = vec![LaneCheckpoint::default(); lanes];
        let states = DualResidencyHandle::from_host(Extent::d1(lanes), &fresh, device)?;
        Ok(Self { states })
    }

    pub fn lanes(&self) -> usize {
        self.states.extent().elements()
    }

    pub fn handle(&self) -> &DualResidencyHandle<LaneCheckpoint<S>> {
        &self.states
    }

    pub fn lanes_on(&self, side: Side) -> Result<MappedRwLockWriteGuard<'_, [LaneCheckpoint<S>]>> {
        Ok(self.states.write_on(side)?)
    }

    /// Start a new logical pass: every lane back to [`LaneStatus::Fresh`].
    pub fn reset(&self) -> Result<()> {
        let mut lanes = self.states.write_on(Side::Host)?;
        lanes.fill(LaneCheckpoint::default());
        Ok(())
    }

    /// Lanes that still have work in this pass.
    pub fn continuing(&self) -> Result<usize> {
        let lanes = self.states.read_on(Side::Host)?;
        Ok(lanes.iter().filter(|cp| cp.is_continuing()).count())
    }

    /// Draws owed across all lanes.
    pub fn pending(&self) -> Result<u64> {
        let lanes = self.states.read_on(Side::Host)?;
        Ok(lanes.iter().map(|cp| cp.pending).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_returns_lanes_to_fresh() {
        let store = CheckpointStore::<()>::new(3, None).unwrap();
        {
            let mut lanes = store.lanes_on(Side::Host).unwrap();
            lanes[0].status = LaneStatus::Finished;
            lanes[1].status = LaneStatus::Suspended;
            lanes[1].pending = 4;
        }
        assert_eq!(store.continuing().unwrap(), 2);
        assert_eq!(store.pending().unwrap(), 4);

        store.reset().unwrap();
        assert_eq!(store.continuing().unwrap(), 3);
        assert_eq!(store.pending().unwrap(), 0);
    }

    #[test]
    fn checkpoints_survive_a_device_round_trip() {
        let arena = DeviceArena::unbounded("checkpoints");
        let store = CheckpointStore::<u64>::new(2, Some(arena)).unwrap();
        {
            let mut lanes = store.lanes_on(Side::Device).unwrap();
            lanes[1].model_state = 99;
            lanes[1].status = LaneStatus::Suspended;
        }
        let host = store.handle().to_vec().unwrap();
        assert_eq!(host[1].model_state, 99);
        assert_eq!(host[1].status, LaneStatus::Suspended);
    }
}
