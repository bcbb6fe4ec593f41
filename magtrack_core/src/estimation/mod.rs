// magtrack_core/src/estimation/mod.rs

//! The per-cycle estimation pipeline:
//! ranking -> seeding -> solving -> divergence guard -> end-effector projection.

pub mod engine;
pub mod guard;
pub mod ranking;
pub mod seed;

pub use engine::PositionEngine;
pub use guard::{DivergenceGuard, OutOfBounds};
pub use ranking::rank_sensors;
pub use seed::initial_guess;

use tracing::{debug, trace};

use crate::models::effector::EndEffectorEstimate;
use crate::solver::{IterationEvent, SolverObserver, SolverReport, SolverStatus};
use crate::types::{Position, RankedIndices};

// =========================================================================
// == Cycle Output ==
// =========================================================================

/// Outcome tag attached to every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Converged,
    /// The iteration budget ran out; the best estimate so far is still reported.
    MaxIterationsReached,
    /// The budget ran out inside the damping retry loop: the Hessian never
    /// became positive-definite or never produced a non-increasing step.
    IllConditioned,
    /// The fix left the working volume and was discarded; the next cycle reseeds.
    OutOfBounds,
    /// The magnet estimate is valid but no end-effector could be projected.
    DegenerateGeometry,
}

impl From<SolverStatus> for CycleStatus {
    fn from(status: SolverStatus) -> Self {
        match status {
            SolverStatus::Converged => CycleStatus::Converged,
            SolverStatus::IllConditioned => CycleStatus::IllConditioned,
            // `solve` always finishes in one of the three terminal states; an
            // unfinished one can only mean the budget was never spent.
            SolverStatus::MaxIterationsReached
            | SolverStatus::Seeded
            | SolverStatus::Iterating => CycleStatus::MaxIterationsReached,
        }
    }
}

impl CycleStatus {
    /// Final tag for a cycle that stayed inside the working volume.
    ///
    /// A failed projection turns a usable fix into `DegenerateGeometry`, but an
    /// exhausted damping budget keeps its own tag.
    pub fn after_projection(solver: SolverStatus, projected: bool) -> Self {
        match Self::from(solver) {
            CycleStatus::IllConditioned => CycleStatus::IllConditioned,
            _ if !projected => CycleStatus::DegenerateGeometry,
            status => status,
        }
    }
}

/// Non-fatal conditions that accompany an otherwise usable fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleWarning {
    /// The reconstructed tool length disagrees with the configured one.
    GeometryInconsistent {
        tool_length_error: f64,
        tolerance: f64,
    },
    /// No end-effector could be projected from the magnet estimate.
    ProjectionWithheld,
}

/// Everything one engine cycle produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutput {
    pub status: CycleStatus,
    /// The sensors used, in the order their residuals were formed.
    pub ranked: RankedIndices,
    /// Best magnet estimate. For `OutOfBounds` this is the discarded candidate.
    pub magnet_position: Position,
    /// Withheld on `OutOfBounds` and `DegenerateGeometry`.
    pub effector: Option<EndEffectorEstimate>,
    pub report: SolverReport,
    /// True when this cycle started from a fresh initial guess.
    pub reseeded: bool,
    pub warnings: Vec<CycleWarning>,
}

impl CycleOutput {
    pub fn tool_length_error(&self) -> Option<f64> {
        self.effector.map(|e| e.tool_length_error)
    }

    /// A fix that can be handed downstream as-is.
    pub fn is_trusted(&self) -> bool {
        self.status == CycleStatus::Converged && self.warnings.is_empty()
    }
}

// =========================================================================
// == Observability Hooks ==
// =========================================================================

/// Hook invoked at fixed points of every cycle.
///
/// Implementations only watch; nothing they do can change the estimate.
pub trait EngineObserver: SolverObserver {
    fn on_reseed(&mut self, seed: &Position) {
        let _ = seed;
    }

    fn on_cycle(&mut self, output: &CycleOutput) {
        let _ = output;
    }
}

impl EngineObserver for () {}

/// Forwards every hook to `tracing` at trace/debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SolverObserver for TracingObserver {
    fn on_iteration(&mut self, event: &IterationEvent) {
        trace!(
            iteration = event.iteration,
            lambda = event.lambda,
            error = event.error,
            trial_error = ?event.trial_error,
            accepted = event.accepted,
            "lm step"
        );
    }
}

impl EngineObserver for TracingObserver {
    fn on_reseed(&mut self, seed: &Position) {
        debug!(x = seed.x, y = seed.y, z = seed.z, "solver seeded");
    }

    fn on_cycle(&mut self, output: &CycleOutput) {
        let p = &output.magnet_position;
        debug!(
            status = ?output.status,
            ranked = ?output.ranked.as_slice(),
            x = p.x,
            y = p.y,
            z = p.z,
            iterations = output.report.iterations,
            error = output.report.error,
            tool_length_error = ?output.tool_length_error(),
            "cycle complete"
        );
    }
}
