// magtrack_core/src/models/effector.rs

//! Back-projection from the tracked magnet to the tool tip.
//!
//! The tool shaft passes through the centre of the sensor ring. The magnet sits
//! on the handle side at distance `|X|` from the ring origin; the remaining
//! `tool_length − |X|` of shaft continues through the origin to the tip.
//!
//! ```text
//!        |          |    ----> handle
//!        ---|    |---    ----> magnet          ==
//!             ||                                |  |X|
//!   []=====[]====[]=====[] ----> ring origin   ==
//!             ||                                |  tool_length − |X|
//!             VV         ----> end-effector    ==
//! ```

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::estimation::CycleWarning;
use crate::types::{Position, POSITION_DIM};

/// The projected tool tip and its reconstructed-length self-check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EndEffectorEstimate {
    pub position: Position,
    /// `tool_length − |magnet − tip|`. Ideally zero.
    pub tool_length_error: f64,
}

impl EndEffectorEstimate {
    /// Flags a fix whose reconstructed tool length drifts past `tolerance`.
    pub fn check(&self, tolerance: f64) -> Option<CycleWarning> {
        if self.tool_length_error.abs() > tolerance {
            Some(CycleWarning::GeometryInconsistent {
                tool_length_error: self.tool_length_error,
                tolerance,
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndEffectorProjector {
    tool_length: f64,
}

impl EndEffectorProjector {
    pub fn new(tool_length: f64) -> Self {
        Self { tool_length }
    }

    /// Projects the tool tip from a magnet position relative to the ring origin.
    ///
    /// Pure: the same inputs always give the same estimate.
    pub fn project(&self, magnet: &Position) -> Result<EndEffectorEstimate, EngineError> {
        let vector_length = magnet.norm();
        if !(vector_length.is_finite() && vector_length > 0.0) {
            return Err(EngineError::DegenerateGeometry);
        }

        let dist_to_effector = self.tool_length - vector_length;

        // Direction angles of the magnet vector, then continue the shaft past the
        // origin by rotating each one half a turn.
        let mut position = Position::zeros();
        for i in 0..POSITION_DIM {
            let angle = (magnet[i] / vector_length).clamp(-1.0, 1.0).acos();
            position[i] = dist_to_effector * (angle + PI).cos();
        }

        let calc_tool_length = (magnet - position).norm();

        Ok(EndEffectorEstimate {
            position,
            tool_length_error: self.tool_length - calc_tool_length,
        })
    }
}
