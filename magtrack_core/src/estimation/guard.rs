// magtrack_core/src/estimation/guard.rs

use nalgebra::Vector3;

use crate::config::BoundsConfig;
use crate::types::{Position, POSITION_DIM};

/// Why a committed candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutOfBounds {
    pub axis: usize,
    pub value: f64,
    pub limit: f64,
}

/// Rejects fixes that leave the working volume.
///
/// The inverse-sixth-power model flattens out far from the ring, so a weak or
/// ambiguous signal can pull the solver into a distant minimum that still
/// fits the readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DivergenceGuard {
    half_extents: Vector3<f64>,
}

impl DivergenceGuard {
    pub fn new(config: &BoundsConfig) -> Self {
        Self {
            half_extents: Vector3::from(config.half_extents),
        }
    }

    /// A coordinate whose magnitude reaches its half-extent is out of bounds.
    /// NaN coordinates are out of bounds as well.
    pub fn check(&self, candidate: &Position) -> Result<(), OutOfBounds> {
        for axis in 0..POSITION_DIM {
            let value = candidate[axis];
            let limit = self.half_extents[axis];
            if !(value.abs() < limit) {
                return Err(OutOfBounds { axis, value, limit });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> DivergenceGuard {
        DivergenceGuard::new(&BoundsConfig {
            half_extents: [500.0, 400.0, 300.0],
        })
    }

    #[test]
    fn inside_volume_passes() {
        assert!(guard().check(&Position::new(499.999, -399.999, 299.999)).is_ok());
    }

    #[test]
    fn exactly_on_the_bound_is_out() {
        let err = guard().check(&Position::new(0.0, 0.0, -300.0)).unwrap_err();
        assert_eq!(
            err,
            OutOfBounds {
                axis: 2,
                value: -300.0,
                limit: 300.0
            }
        );
        assert!(guard().check(&Position::new(500.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn every_axis_is_checked() {
        assert_eq!(
            guard().check(&Position::new(0.0, 401.0, 0.0)).unwrap_err().axis,
            1
        );
    }

    #[test]
    fn nan_is_out_of_bounds() {
        assert!(guard().check(&Position::new(f64::NAN, 0.0, 0.0)).is_err());
    }
}
