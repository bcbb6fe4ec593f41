// magtrack_core/src/prelude.rs

// --- Core Abstractions ---
pub use crate::estimation::EngineObserver;
pub use crate::solver::{LeastSquaresProblem, SolverObserver};

// --- Core Data Structures ---
pub use crate::config::EngineConfig;
pub use crate::error::EngineError;
pub use crate::types::{Position, RankedIndices, SensorGeometry, SensorReading, SensorReadings};

// --- Estimation ---
pub use crate::estimation::{
    CycleOutput, CycleStatus, CycleWarning, PositionEngine, TracingObserver,
};
pub use crate::solver::{LevenbergMarquardt, SolverReport, SolverState, SolverStatus};

// --- Concrete Models ---
pub use crate::models::effector::{EndEffectorEstimate, EndEffectorProjector};
pub use crate::models::measurement::{DipoleFieldModel, DipoleProblem};
