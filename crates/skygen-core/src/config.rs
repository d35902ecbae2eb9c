//! Sampler configuration
//!
//! [`SkygenConfig`] carries the magnitude binning, distance limits, traversal
//! and launch sizing, normalization and RNG seeding for one catalog run. It
//! deserializes from JSON with every field optional:
//!
//! ```rust
//! use skygen_core::SkygenConfig;
//!
//! let config = SkygenConfig::from_json(r#"{ "m1": 22.0, "lanes": 4096 }"#).unwrap();
//! assert_eq!(config.lanes, 4096);
//! assert_eq!(config.block_size, 10);
//! ```

use serde::{Deserialize, Serialize};
use skygen_backends::backend::grid::{DEFAULT_GROUP_SIZE, DEFAULT_SCRATCH_BUDGET, DEFAULT_STATIC_SCRATCH};

use crate::error::{Result, SkygenError};
use crate::rng::DEFAULT_STREAMS;
use crate::traversal::GridShape;

/// Log10-density histogram recorded by the counting pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramConfig {
    /// log10(rho) at the centre of bin 0
    pub lrho0: f64,
    /// Bin width in log10(rho)
    pub dlrho: f64,
    pub nbins: usize,
}

impl HistogramConfig {
    /// Bin for a density, clamped to `[0, nbins)`. Zero or negative
    /// densities fall into bin 0.
    pub fn bin(&self, rho: f64) -> usize {
        let raw = ((rho.log10() - self.lrho0) / self.dlrho).round();
        if raw.is_nan() || raw < 0.0 {
            0
        } else {
            (raw as usize).min(self.nbins.saturating_sub(1))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkygenConfig {
    /// Apparent magnitude at the centre of bin 0
    pub m0: f64,
    /// Limiting apparent magnitude
    pub m1: f64,
    /// Apparent magnitude bin width
    pub dm: f64,
    pub abs_mag_bright: f64,
    /// Absolute magnitude at the centre of bin 0; bins run brighter from here
    pub abs_mag_faint: f64,
    pub d_abs_mag: f64,

    /// Distance limits in parsecs; both zero means unlimited
    pub dmin: f64,
    pub dmax: f64,

    /// Consecutive diagonal steps per traversal block
    pub block_size: u32,
    pub lanes: u64,
    pub group_size: u32,
    pub scratch_budget: usize,
    pub static_scratch: usize,

    pub norm: f64,
    /// When set, the drawing pass rescales `norm` so the coverage-weighted
    /// expected count equals this value
    pub target_count: Option<f64>,

    pub sun_distance_pc: f64,
    pub seed: u64,
    pub streams: usize,

    pub histogram: Option<HistogramConfig>,
}

impl Default for SkygenConfig {
    fn default() -> Self {
        Self {
            m0: 15.0,
            m1: 21.5,
            dm: 0.5,
            abs_mag_bright: 0.0,
            abs_mag_faint: 15.0,
            d_abs_mag: 0.5,
            dmin: 0.0,
            dmax: 0.0,
            block_size: 10,
            lanes: 1 << 14,
            group_size: DEFAULT_GROUP_SIZE,
            scratch_budget: DEFAULT_SCRATCH_BUDGET,
            static_scratch: DEFAULT_STATIC_SCRATCH,
            norm: 1.0,
            target_count: None,
            sun_distance_pc: 8000.0,
            seed: 42,
            streams: DEFAULT_STREAMS,
            histogram: None,
        }
    }
}

impl SkygenConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of apparent-magnitude bins; the last bin centre does not pass `m1`.
    pub fn apparent_bins(&self) -> u32 {
        bin_count(self.m1 - self.m0, self.dm)
    }

    pub fn absolute_bins(&self) -> u32 {
        bin_count(self.abs_mag_faint - self.abs_mag_bright, self.d_abs_mag)
    }

    pub fn grid_shape(&self) -> GridShape {
        GridShape::new(self.apparent_bins(), self.absolute_bins())
    }

    pub fn distance_limited(&self) -> bool {
        self.dmin != 0.0 || self.dmax != 0.0
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [("dm", self.dm), ("d_abs_mag", self.d_abs_mag)];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(SkygenError::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if self.m1 < self.m0 {
            return Err(SkygenError::Config(format!("m1 ({}) is brighter than m0 ({})", self.m1, self.m0)));
        }
        if self.abs_mag_faint < self.abs_mag_bright {
            return Err(SkygenError::Config(format!(
                "abs_mag_faint ({}) is brighter than abs_mag_bright ({})",
                self.abs_mag_faint, self.abs_mag_bright
            )));
        }
        if self.block_size == 0 {
            return Err(SkygenError::Config("block_size must be at least 1".into()));
        }
        if self.lanes == 0 {
            return Err(SkygenError::Config("lanes must be at least 1".into()));
        }
        if self.distance_limited() && self.dmax <= self.dmin {
            return Err(SkygenError::Config(format!(
                "distance range [{}, {}) is empty",
                self.dmin, self.dmax
            )));
        }
        if !(self.norm >= 0.0) {
            return Err(SkygenError::Config(format!("norm must be non-negative, got {}", self.norm)));
        }
        if let Some(hist) = &self.histogram {
            if hist.nbins == 0 || !(hist.dlrho > 0.0) {
                return Err(SkygenError::Config("histogram needs nbins > 0 and dlrho > 0".into()));
            }
        }
        Ok(())
    }
}

fn bin_count(span: f64, width: f64) -> u32 {
    (span / width + 1e-9).floor() as u32 + 1
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SkygenConfig::default();
        config.validate().unwrap();
        assert_eq!(config.apparent_bins(), 14);
        assert_eq!(config.absolute_bins(), 31);
    }

    #[test]
    fn json_round_trip_keeps_fields() {
        let config = SkygenConfig {
            target_count: Some(1e6),
            histogram: Some(HistogramConfig {
                lrho0: -3.0,
                dlrho: 0.5,
                nbins: 20,
            }),
            ..SkygenConfig::default()
        };
        let parsed = SkygenConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn rejects_degenerate_binning() {
        let config = SkygenConfig {
            dm: 0.0,
            ..SkygenConfig::default()
        };
        assert!(matches!(config.validate(), Err(SkygenError::Config(_))));

        let config = SkygenConfig {
            dmin: 100.0,
            dmax: 50.0,
            ..SkygenConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(SkygenConfig::from_json("{ m1: }"), Err(SkygenError::Json(_))));
    }

    #[test]
    fn histogram_bins_clamp() {
        let hist = HistogramConfig {
            lrho0: -2.0,
            dlrho: 1.0,
            nbins: 5,
        };
        assert_eq!(hist.bin(1e-2), 0);
        assert_eq!(hist.bin(1.0), 2);
        assert_eq!(hist.bin(1e-9), 0);
        assert_eq!(hist.bin(1e9), 4);
    }
}
