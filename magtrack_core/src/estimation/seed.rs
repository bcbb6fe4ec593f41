// magtrack_core/src/estimation/seed.rs

use crate::error::EngineError;
use crate::types::{Position, RankedIndices, SensorGeometry, POSITION_DIM};

/// Starting point for a fresh solver run.
///
/// The centroid of the ranked sensors, nudged along the last axis by
/// `axial_offset` so the seed never lies on the sensor plane, where the
/// axial derivative of the field model vanishes.
pub fn initial_guess(
    ranked: &RankedIndices,
    geometry: &SensorGeometry,
    axial_offset: f64,
) -> Result<Position, EngineError> {
    if ranked.is_empty() {
        return Err(EngineError::InsufficientSensors {
            available: 0,
            required: POSITION_DIM,
        });
    }

    let mut sum = Position::zeros();
    for &index in ranked.iter() {
        let position = geometry.position(index).ok_or_else(|| {
            EngineError::InvalidSensorMap(format!("ranked sensor {index} has no known position"))
        })?;
        sum += position;
    }

    let mut guess = sum / ranked.len() as f64;
    guess[POSITION_DIM - 1] += axial_offset;
    Ok(guess)
}
