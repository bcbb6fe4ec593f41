// magtrack_core/src/estimation/ranking.rs

use crate::error::EngineError;
use crate::types::{RankedIndices, POSITION_DIM};

/// Picks the `count` sensors with the largest calibrated norms.
///
/// A single pass keeps the running maxima in descending order; a new value
/// takes the first slot it strictly beats and shifts the holders below it down
/// one place. Strict comparison means ties go to the lowest index. The winners
/// are then put back in ascending index order.
pub fn rank_sensors(norms: &[f64], count: usize) -> Result<RankedIndices, EngineError> {
    if count < POSITION_DIM {
        return Err(EngineError::InvalidConfig(format!(
            "cannot rank fewer than {POSITION_DIM} sensors, asked for {count}"
        )));
    }
    if norms.len() < count {
        return Err(EngineError::InsufficientSensors {
            available: norms.len(),
            required: count,
        });
    }
    if let Some(sensor) = norms.iter().position(|v| !v.is_finite()) {
        return Err(EngineError::NonFiniteReading { sensor });
    }

    // (norm, sensor index), largest first.
    let mut top: Vec<(f64, usize)> = Vec::with_capacity(count + 1);
    for (i, &value) in norms.iter().enumerate() {
        let slot = top
            .iter()
            .position(|&(held, _)| value > held)
            .unwrap_or(top.len());
        if slot < count {
            top.insert(slot, (value, i));
            top.truncate(count);
        }
    }

    Ok(RankedIndices::from_selection(
        top.into_iter().map(|(_, i)| i).collect(),
    ))
}
