// magtrack_core/src/config.rs

//! Tuning constants for the estimation engine.
//!
//! Everything here is plain data that deserializes from the `[engine]` table of
//! a scenario file. Missing sections fall back to the defaults below.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::POSITION_DIM;

// =========================================================================
// == Top-Level Engine Configuration ==
// =========================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub dipole: DipoleConfig,
    pub tool: ToolConfig,
    pub bounds: BoundsConfig,
    pub seed: SeedConfig,
    pub solver: SolverConfig,
}

impl EngineConfig {
    /// Checks every constant once, before the engine is built.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.dipole.validate()?;
        self.tool.validate()?;
        self.bounds.validate()?;
        self.seed.validate()?;
        self.solver.validate()
    }
}

// =========================================================================
// == Configuration Sub-Structs ==
// =========================================================================

/// Physical constants of the magnet / sensor pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DipoleConfig {
    /// Magnet constant K in G²·m⁶, calibrated offline.
    pub k: f64,
    /// Metres per working length unit (1e-3 when geometry is given in millimetres).
    pub meters_per_unit: f64,
}

impl Default for DipoleConfig {
    fn default() -> Self {
        Self {
            k: 1.09e-6,
            meters_per_unit: 1e-3,
        }
    }
}

impl DipoleConfig {
    fn validate(&self) -> Result<(), EngineError> {
        positive("dipole.k", self.k)?;
        positive("dipole.meters_per_unit", self.meters_per_unit)
    }
}

/// Geometry of the tracked tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Length from magnet-side reference to the tool tip (scissors: 318 mm).
    pub length: f64,
    /// Largest acceptable reconstructed-length error before the fix is flagged.
    pub length_tolerance: f64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            length: 318.0,
            length_tolerance: 1.0,
        }
    }
}

impl ToolConfig {
    fn validate(&self) -> Result<(), EngineError> {
        positive("tool.length", self.length)?;
        positive("tool.length_tolerance", self.length_tolerance)
    }
}

/// The physically plausible working volume, symmetric about the ring origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundsConfig {
    pub half_extents: [f64; 3],
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            half_extents: [500.0, 500.0, 500.0],
        }
    }
}

impl BoundsConfig {
    fn validate(&self) -> Result<(), EngineError> {
        for (axis, extent) in self.half_extents.iter().enumerate() {
            positive(&format!("bounds.half_extents[{axis}]"), *extent)?;
        }
        Ok(())
    }
}

/// How the solver is (re)seeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedConfig {
    /// How many of the strongest sensors feed the seed and the solver.
    pub ranked_count: usize,
    /// Offset added to the last axis of the sensor centroid.
    ///
    /// The field model only sees the square of the axial displacement, so the
    /// sign picks the side of the sensor plane the solver settles on.
    pub axial_offset: f64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            ranked_count: POSITION_DIM,
            axial_offset: -10.0,
        }
    }
}

impl SeedConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.ranked_count < POSITION_DIM {
            return Err(EngineError::InvalidConfig(format!(
                "seed.ranked_count must be at least {POSITION_DIM}, got {}",
                self.ranked_count
            )));
        }
        if !self.axial_offset.is_finite() || self.axial_offset == 0.0 {
            return Err(EngineError::InvalidConfig(
                "seed.axial_offset must be finite and non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Levenberg-Marquardt tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub init_lambda: f64,
    pub up_factor: f64,
    pub down_factor: f64,
    /// An accepted step that lowers the error by less than this ends the run.
    pub target_derr: f64,
    pub max_iterations: usize,
    /// Forward-difference step for the numerical gradient, in working units.
    pub fd_step: f64,
    /// Floor for a warm-started damping factor.
    pub min_lambda: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            init_lambda: 1e-4,
            up_factor: 10.0,
            down_factor: 10.0,
            target_derr: 1e-12,
            max_iterations: 10_000,
            fd_step: 1e-7,
            min_lambda: 1e-20,
        }
    }
}

impl SolverConfig {
    fn validate(&self) -> Result<(), EngineError> {
        positive("solver.init_lambda", self.init_lambda)?;
        positive("solver.target_derr", self.target_derr)?;
        positive("solver.fd_step", self.fd_step)?;
        positive("solver.min_lambda", self.min_lambda)?;
        if !(self.up_factor.is_finite() && self.up_factor > 1.0) {
            return Err(EngineError::InvalidConfig(
                "solver.up_factor must be greater than 1".to_string(),
            ));
        }
        if !(self.down_factor.is_finite() && self.down_factor > 1.0) {
            return Err(EngineError::InvalidConfig(
                "solver.down_factor must be greater than 1".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(EngineError::InvalidConfig(
                "solver.max_iterations must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}
