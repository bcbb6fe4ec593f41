// magtrack_core/src/error.rs

use thiserror::Error;

/// Every condition the engine can refuse to continue on.
///
/// Recoverable solver conditions (a rejected step, a damped retry, running out of
/// iterations, leaving the working volume) are *not* errors; they are reported
/// through [`crate::estimation::CycleStatus`] so the caller always gets an estimate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Fewer sensors than unknowns were offered for ranking.
    #[error("insufficient sensors: {available} available, at least {required} required")]
    InsufficientSensors { available: usize, required: usize },

    /// The magnet estimate sits on the ring origin, so no shaft direction exists.
    #[error("degenerate geometry: magnet position coincides with the ring origin")]
    DegenerateGeometry,

    /// A sensor map did not cover exactly the indices `0..n`.
    #[error("invalid sensor map: {0}")]
    InvalidSensorMap(String),

    /// A reading batch does not match the configured ring.
    #[error("sensor count mismatch: geometry has {expected} sensors, batch has {actual}")]
    SensorCountMismatch { expected: usize, actual: usize },

    #[error("sensor {sensor} produced a non-finite reading")]
    NonFiniteReading { sensor: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cholesky pivot fell below tolerance.
    #[error("matrix is not positive-definite (pivot {pivot} = {value:e})")]
    NotPositiveDefinite { pivot: usize, value: f64 },
}
