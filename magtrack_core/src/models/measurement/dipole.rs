// magtrack_core/src/models/measurement/dipole.rs

use crate::config::DipoleConfig;
use crate::error::EngineError;
use crate::solver::LeastSquaresProblem;
use crate::types::{Position, RankedIndices, SensorGeometry, POSITION_DIM};

/// Squared field magnitude of an axially magnetised point dipole.
///
/// For a sensor at `P` and a magnet at `X`, with `d = X − P` in metres:
///
/// `|B|² = K · |d|⁻⁶ · (3·(d_z/|d|)² + 1)`
///
/// Positions are given in working units and scaled by `meters_per_unit`
/// before `K` (G²·m⁶) is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct DipoleFieldModel {
    k: f64,
    meters_per_unit: f64,
}

impl DipoleFieldModel {
    pub fn new(config: &DipoleConfig) -> Self {
        Self {
            k: config.k,
            meters_per_unit: config.meters_per_unit,
        }
    }

    /// Predicted squared field magnitude seen by a sensor at `sensor`.
    pub fn squared_magnitude(&self, magnet: &Position, sensor: &Position) -> f64 {
        let d = (magnet - sensor) * self.meters_per_unit;
        let r = d.norm();
        let cos_axial = d.z / r;
        self.k * r.powi(-6) * (3.0 * cos_axial * cos_axial + 1.0)
    }
}

// =========================================================================
// == Least-Squares Binding ==
// =========================================================================

/// The per-cycle fitting problem: one equation per ranked sensor.
///
/// Measurement `i` belongs to sensor `ranked[i]`, so residuals follow the
/// ascending index order of the ranking.
#[derive(Debug, Clone)]
pub struct DipoleProblem<'a> {
    model: &'a DipoleFieldModel,
    sensors: Vec<Position>,
    observed_sq: Vec<f64>,
    fd_step: f64,
}

impl<'a> DipoleProblem<'a> {
    /// `norms` holds the calibrated field norm of every sensor in the ring.
    ///
    /// Fails unless every ranked index has both a position and a norm, and
    /// there are at least as many equations as unknowns.
    pub fn new(
        model: &'a DipoleFieldModel,
        geometry: &SensorGeometry,
        ranked: &RankedIndices,
        norms: &[f64],
        fd_step: f64,
    ) -> Result<Self, EngineError> {
        if ranked.len() < POSITION_DIM {
            return Err(EngineError::InsufficientSensors {
                available: ranked.len(),
                required: POSITION_DIM,
            });
        }
        if norms.len() != geometry.len() {
            return Err(EngineError::SensorCountMismatch {
                expected: geometry.len(),
                actual: norms.len(),
            });
        }

        let mut sensors = Vec::with_capacity(ranked.len());
        let mut observed_sq = Vec::with_capacity(ranked.len());
        for &index in ranked.iter() {
            let (Some(position), Some(norm)) = (geometry.position(index), norms.get(index)) else {
                return Err(EngineError::InvalidSensorMap(format!(
                    "ranked sensor {index} is not part of the ring"
                )));
            };
            sensors.push(*position);
            observed_sq.push(norm * norm);
        }

        Ok(Self {
            model,
            sensors,
            observed_sq,
            fd_step,
        })
    }

    /// Predicted minus observed squared magnitude, one entry per ranked sensor.
    pub fn residuals(&self, magnet: &Position) -> Vec<f64> {
        (0..self.sensors.len())
            .map(|i| self.evaluate(magnet, i) - self.observed_sq[i])
            .collect()
    }
}

impl LeastSquaresProblem<3> for DipoleProblem<'_> {
    fn num_measurements(&self) -> usize {
        self.sensors.len()
    }

    fn observation(&self, index: usize) -> f64 {
        self.observed_sq[index]
    }

    fn evaluate(&self, params: &Position, index: usize) -> f64 {
        self.model.squared_magnitude(params, &self.sensors[index])
    }

    fn finite_difference_step(&self) -> f64 {
        self.fd_step
    }
}
