// magtrack_core/src/types.rs

use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// --- Core Type Aliases ---
/// A point in the working frame of the sensor ring (working length units).
pub type Position = Vector3<f64>;

/// Number of unknowns the engine solves for (x, y, z).
pub const POSITION_DIM: usize = 3;

// =========================================================================
// == Sensor Readings ==
// =========================================================================

/// A single calibrated (baseline-subtracted) 3-axis field reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorReading {
    pub field: Vector3<f64>,
}

impl SensorReading {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            field: Vector3::new(x, y, z),
        }
    }

    /// The L2 norm of the calibrated field vector.
    pub fn norm(&self) -> f64 {
        self.field.norm()
    }

    pub fn is_finite(&self) -> bool {
        self.field.iter().all(|v| v.is_finite())
    }
}

impl From<Vector3<f64>> for SensorReading {
    fn from(field: Vector3<f64>) -> Self {
        Self { field }
    }
}

/// One acquisition cycle worth of calibrated readings, densely keyed by sensor index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SensorReadings(Vec<SensorReading>);

impl SensorReadings {
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self(readings)
    }

    /// Builds a batch from a `sensor-index -> field` mapping.
    /// The mapping must contain exactly the indices `0..n`.
    pub fn from_map(map: &BTreeMap<usize, Vector3<f64>>) -> Result<Self, EngineError> {
        let dense = densify(map)?;
        Ok(Self(dense.into_iter().map(SensorReading::from).collect()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SensorReading> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorReading> {
        self.0.iter()
    }

    /// The scalar norm of every reading, in sensor-index order.
    pub fn norms(&self) -> Vec<f64> {
        self.0.iter().map(SensorReading::norm).collect()
    }

    pub fn as_slice(&self) -> &[SensorReading] {
        &self.0
    }
}

impl FromIterator<SensorReading> for SensorReadings {
    fn from_iter<I: IntoIterator<Item = SensorReading>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =========================================================================
// == Sensor Geometry ==
// =========================================================================

/// The fixed positions of the ring sensors in the working frame.
///
/// Immutable once built. Ranking, seeding and the measurement model all read
/// from the same table.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorGeometry {
    positions: Vec<Position>,
}

impl SensorGeometry {
    /// Builds a geometry from positions listed in sensor-index order.
    pub fn new(positions: Vec<Position>) -> Result<Self, EngineError> {
        if positions.len() < POSITION_DIM {
            return Err(EngineError::InsufficientSensors {
                available: positions.len(),
                required: POSITION_DIM,
            });
        }
        if let Some(bad) = positions
            .iter()
            .position(|p| !p.iter().all(|c| c.is_finite()))
        {
            return Err(EngineError::InvalidSensorMap(format!(
                "sensor {bad} has a non-finite position"
            )));
        }
        Ok(Self { positions })
    }

    /// Builds a geometry from a `sensor-index -> (x, y, z)` mapping.
    pub fn from_map(map: &BTreeMap<usize, Position>) -> Result<Self, EngineError> {
        Self::new(densify(map)?)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, index: usize) -> Option<&Position> {
        self.positions.get(index)
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }
}

/// Converts an index-keyed map into a dense vector, rejecting gaps.
/// `BTreeMap` keys are already unique and sorted, so a gap is the only failure.
fn densify<T: Copy>(map: &BTreeMap<usize, T>) -> Result<Vec<T>, EngineError> {
    let mut dense = Vec::with_capacity(map.len());
    for (expected, (&index, value)) in map.iter().enumerate() {
        if index != expected {
            return Err(EngineError::InvalidSensorMap(format!(
                "expected sensor index {expected}, found {index}"
            )));
        }
        dense.push(*value);
    }
    Ok(dense)
}

// =========================================================================
// == Ranked Indices ==
// =========================================================================

/// Indices of the most informative sensors, always in ascending index order.
///
/// The order matters: residual `i` of the measurement model belongs to sensor
/// `ranked[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RankedIndices(Vec<usize>);

impl RankedIndices {
    /// Wraps a selection, canonicalising it to ascending order.
    pub fn from_selection(mut indices: Vec<usize>) -> Self {
        indices.sort();
        Self(indices)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.0.iter()
    }
}
