//! Launch sizing and stream pool checks performed when a generator is built.

use glam::DVec3;
use skygen_backends::{HostSequentialHarness, ParallelHarness};
use skygen_core::{
    DensityModel, Footprint, Homogeneous, LaneRng, NoExtinction, SkyGenerator, SkygenConfig, SkygenError, StarTable,
};

/// Exponential disk that keeps a bulky per-lane state.
#[derive(Debug, Clone, Copy)]
struct BulkyDisk {
    rho0: f64,
    scale_height: f64,
}

impl DensityModel for BulkyDisk {
    type State = [f64; 16];

    fn setpos(&self, state: &mut [f64; 16], pos: DVec3) {
        state[0] = (-pos.z.abs() / self.scale_height).exp();
        state[1] = pos.z;
    }

    fn density(&self, state: &[f64; 16], _abs_mag: f64) -> f64 {
        self.rho0 * state[0]
    }

    fn component(&self, state: &[f64; 16], _pos: DVec3, _abs_mag: f64, _rng: &mut LaneRng) -> u32 {
        u32::from(state[1] < 0.0)
    }
}

fn footprint() -> Footprint {
    Footprint::polar_cap(0, 0.04, 0.02, None).unwrap()
}

#[test]
fn test_thousand_lanes_fit_default_groups() {
    let config = SkygenConfig {
        lanes: 1000,
        streams: 1000,
        ..SkygenConfig::default()
    };
    let generator =
        SkyGenerator::new(config, Homogeneous::new(1e-3), footprint(), NoExtinction, HostSequentialHarness::new())
            .unwrap();
    let launch = generator.launch_config();
    assert_eq!(launch.block.x, 192);
    assert_eq!(launch.total_lanes(), 1152);
    assert_eq!(generator.checkpoints().lanes(), 1000);
}

#[test]
fn test_bulky_state_shrinks_groups() {
    let config = SkygenConfig {
        lanes: 1000,
        streams: 1000,
        ..SkygenConfig::default()
    };
    let model = BulkyDisk {
        rho0: 0.05,
        scale_height: 300.0,
    };
    let generator = SkyGenerator::new(config, model, footprint(), NoExtinction, ParallelHarness::new()).unwrap();
    let launch = generator.launch_config();
    // (16384 - 96) / (128 + 12) lanes per group
    assert_eq!(launch.block.x, 116);
    assert!(launch.total_lanes() >= 1000);
    assert!(launch.total_lanes() - 1000 < 116);
    assert!(launch.scratch.size_bytes <= 16_384);
}

#[test]
fn test_bulky_state_draws_below_the_plane() {
    let config = SkygenConfig {
        m0: 16.0,
        m1: 19.0,
        lanes: 32,
        streams: 32,
        target_count: Some(200.0),
        ..SkygenConfig::default()
    };
    let model = BulkyDisk {
        rho0: 0.05,
        scale_height: 300.0,
    };
    let footprint = Footprint::polar_cap(1, 0.04, 0.02, None).unwrap();
    let mut generator = SkyGenerator::new(config, model, footprint, NoExtinction, ParallelHarness::new()).unwrap();
    let sink = StarTable::with_capacity(5000);
    generator.run(&sink, |_| Ok(())).unwrap();
    let stars = sink.stars();
    assert!(!stars.is_empty());
    // the southern cap lies below the plane
    assert!(stars.iter().all(|s| s.comp == 1 && s.xyz[2] < 0.0));
}

#[test]
fn test_scratch_budget_too_small_for_one_lane() {
    let config = SkygenConfig {
        lanes: 8,
        streams: 8,
        scratch_budget: 100,
        static_scratch: 96,
        ..SkygenConfig::default()
    };
    let result = SkyGenerator::new(config, Homogeneous::new(1e-3), footprint(), NoExtinction, HostSequentialHarness);
    assert!(matches!(
        result,
        Err(SkygenError::LaunchShape {
            lanes: 8,
            per_lane: 12,
            budget: 100
        })
    ));
}

#[test]
fn test_more_lanes_than_streams_is_fatal() {
    let config = SkygenConfig {
        lanes: 20,
        streams: 10,
        ..SkygenConfig::default()
    };
    let result = SkyGenerator::new(config, Homogeneous::new(1e-3), footprint(), NoExtinction, HostSequentialHarness);
    assert!(matches!(
        result,
        Err(SkygenError::StreamPoolExhausted {
            lanes: 20,
            streams: 10
        })
    ));
}

#[test]
fn test_invalid_config_is_rejected_before_launch() {
    let config = SkygenConfig {
        m0: 20.0,
        m1: 18.0,
        ..SkygenConfig::default()
    };
    let result = SkyGenerator::new(config, Homogeneous::new(1e-3), footprint(), NoExtinction, HostSequentialHarness);
    assert!(matches!(result, Err(SkygenError::Config(_))));
}
