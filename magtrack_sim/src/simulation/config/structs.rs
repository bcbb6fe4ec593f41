// magtrack_sim/src/simulation/config/structs.rs

use anyhow::{bail, ensure, Result};
use magtrack_core::config::EngineConfig;
use serde::{Deserialize, Serialize};

// =========================================================================
// == Top-Level Scenario Configuration ==
// =========================================================================

/// # ScenarioConfig
/// The root of the data parsed from a `scenario.toml` file.
/// Every section is optional and falls back to its default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: Simulation,

    #[serde(default)]
    pub ring: RingConfig,

    #[serde(default)]
    pub motion: MotionPath,

    #[serde(default)]
    pub conditioning: ConditioningConfig,

    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Handed to the engine untouched.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        self.ring.validate()?;
        self.motion.validate()?;
        self.conditioning.validate()?;
        self.acquisition.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Simulation {
    pub name: String,
    /// Optional seed for the pseudo-random number generator for determinism.
    pub seed: Option<u64>,
    /// Number of engine cycles to run.
    pub cycles: usize,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            seed: None,
            cycles: 200,
        }
    }
}

impl Simulation {
    fn validate(&self) -> Result<()> {
        ensure!(self.cycles > 0, "simulation.cycles must be non-zero");
        Ok(())
    }
}

/// The synthetic sensor ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RingConfig {
    /// Sensor positions in working units, indexed by order.
    pub sensors: Vec<[f64; 3]>,
    /// Mean ambient field every sensor sees, in Gauss.
    pub ambient: [f64; 3],
    /// Per-axis spread of the per-sensor ambient offset around `ambient`.
    pub ambient_spread: f64,
    /// Per-axis standard deviation of the white measurement noise, in Gauss.
    pub noise_stddev: f64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            sensors: vec![
                [0.0, -40.0, 0.0],
                [40.0, 0.0, 0.0],
                [0.0, 40.0, 0.0],
                [-40.0, 0.0, 0.0],
            ],
            ambient: [0.2, 0.0, -0.45],
            ambient_spread: 0.05,
            noise_stddev: 0.01,
        }
    }
}

impl RingConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.ambient_spread.is_finite() && self.ambient_spread >= 0.0,
            "ring.ambient_spread must be a finite, non-negative number"
        );
        ensure!(
            self.noise_stddev.is_finite() && self.noise_stddev >= 0.0,
            "ring.noise_stddev must be a finite, non-negative number"
        );
        Ok(())
    }
}

/// The path the magnet follows, sampled once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")] // The "type" field in TOML decides which variant to parse
#[serde(rename_all = "PascalCase")]
pub enum MotionPath {
    Static {
        position: [f64; 3],
    },
    Helix {
        /// Axis of the helix in the ring plane.
        center: [f64; 2],
        radius: f64,
        z_start: f64,
        z_end: f64,
        turns: f64,
    },
    Line {
        from: [f64; 3],
        to: [f64; 3],
    },
    RandomWalk {
        start: [f64; 3],
        /// Largest per-axis move between two cycles.
        step: f64,
        /// Half-extents of the box around `start` the walk is clamped to.
        limits: [f64; 3],
    },
}

impl Default for MotionPath {
    fn default() -> Self {
        // Below the ring plane, matching the default seed offset.
        MotionPath::Helix {
            center: [0.0, 0.0],
            radius: 12.0,
            z_start: -40.0,
            z_end: -60.0,
            turns: 1.0,
        }
    }
}

impl MotionPath {
    fn validate(&self) -> Result<()> {
        match self {
            MotionPath::Helix { radius, turns, .. } => {
                ensure!(*radius >= 0.0, "motion.radius must be non-negative");
                ensure!(turns.is_finite(), "motion.turns must be finite");
            }
            MotionPath::RandomWalk { step, limits, .. } => {
                ensure!(
                    step.is_finite() && *step >= 0.0,
                    "motion.step must be a finite, non-negative number"
                );
                if limits.iter().any(|l| !(*l >= 0.0)) {
                    bail!("motion.limits must be non-negative");
                }
            }
            MotionPath::Static { .. } | MotionPath::Line { .. } => {}
        }
        Ok(())
    }
}

/// Baseline calibration and smoothing applied before the engine sees a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConditioningConfig {
    /// Readings averaged with the magnet absent to form the baseline.
    pub calibration_samples: usize,
    /// Exponential moving average weight of the newest batch, in (0, 1]. 1 disables smoothing.
    pub alpha: f64,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            calibration_samples: 32,
            alpha: 1.0,
        }
    }
}

impl ConditioningConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.calibration_samples > 0,
            "conditioning.calibration_samples must be non-zero"
        );
        ensure!(
            self.alpha > 0.0 && self.alpha <= 1.0,
            "conditioning.alpha must lie in (0, 1], got {}",
            self.alpha
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionConfig {
    /// Sampling rate of the acquisition thread.
    pub rate_hz: f64,
    /// Sample on a producer thread instead of inline with each cycle.
    pub threaded: bool,
    /// How long the consumer waits for a fresh batch before giving up.
    pub timeout_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            rate_hz: 200.0,
            threaded: false,
            timeout_ms: 1_000,
        }
    }
}

impl AcquisitionConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.rate_hz.is_finite() && self.rate_hz > 0.0,
            "acquisition.rate_hz must be positive"
        );
        ensure!(self.timeout_ms > 0, "acquisition.timeout_ms must be non-zero");
        Ok(())
    }
}
