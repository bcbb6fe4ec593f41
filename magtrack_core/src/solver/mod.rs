// magtrack_core/src/solver/mod.rs

//! Generic nonlinear least-squares machinery.
//!
//! Nothing in here knows about magnets: a problem is just `n` scalar
//! measurements `y_i` and a model `f(p, i)` of `M` parameters.

pub mod cholesky;
pub mod levmarq;

pub use cholesky::{Cholesky, CHOLESKY_TOLERANCE};
pub use levmarq::LevenbergMarquardt;

use nalgebra::SVector;

/// Forward-difference step used when a problem does not choose its own.
pub const DEFAULT_FD_STEP: f64 = 1e-7;

// --- LEAST-SQUARES PROBLEM TRAIT ---
// `y_i ≈ f(p, i)` for i in 0..n, with `n >= M`.
pub trait LeastSquaresProblem<const M: usize> {
    /// Number of scalar measurements `n`.
    fn num_measurements(&self) -> usize;

    /// The observed value `y_i`.
    fn observation(&self, index: usize) -> f64;

    /// Predicts measurement `i` from the parameters: `f(p, i)`.
    fn evaluate(&self, params: &SVector<f64, M>, index: usize) -> f64;

    /// Variance of measurement `i`. `None` means unweighted.
    fn variance(&self, index: usize) -> Option<f64> {
        let _ = index;
        None
    }

    fn finite_difference_step(&self) -> f64 {
        DEFAULT_FD_STEP
    }

    /// Gradient of `f(p, i)` with respect to `p`.
    ///
    /// The default is a forward difference. Override it when a closed form exists.
    fn gradient(&self, params: &SVector<f64, M>, index: usize) -> SVector<f64, M> {
        let step = self.finite_difference_step();
        let base = self.evaluate(params, index);
        SVector::from_fn(|i, _| {
            let mut perturbed = *params;
            perturbed[i] += step;
            (self.evaluate(&perturbed, index) - base) / step
        })
    }

    /// Least-squares weight of measurement `i`.
    fn weight(&self, index: usize) -> f64 {
        self.variance(index).map_or(1.0, |v| 1.0 / v)
    }
}

/// The (weighted) sum of squared residuals, `Σ w_i · (f(p, i) - y_i)²`.
pub fn chi_squared<P, const M: usize>(problem: &P, params: &SVector<f64, M>) -> f64
where
    P: LeastSquaresProblem<M> + ?Sized,
{
    (0..problem.num_measurements())
        .map(|i| {
            let residual = problem.evaluate(params, i) - problem.observation(i);
            residual * residual * problem.weight(i)
        })
        .sum()
}

// =========================================================================
// == Solver State & Reporting ==
// =========================================================================

/// Where an optimisation run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    /// Fresh candidate, no iterations run yet.
    Seeded,
    Iterating,
    /// An accepted step improved the error by less than the target.
    Converged,
    /// The iteration budget ran out between accepted steps.
    MaxIterationsReached,
    /// The budget ran out while still damping a non-positive-definite or
    /// error-increasing step.
    IllConditioned,
}

/// The mutable state of one optimisation run.
///
/// The engine keeps this between cycles so each cycle starts from the previous
/// fix and the previous damping factor.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState<const M: usize> {
    pub candidate: SVector<f64, M>,
    pub lambda: f64,
    pub iterations: usize,
    pub error: f64,
    pub derr: f64,
    pub status: SolverStatus,
}

impl<const M: usize> SolverState<M> {
    pub fn seeded(candidate: SVector<f64, M>, init_lambda: f64) -> Self {
        Self {
            candidate,
            lambda: init_lambda,
            iterations: 0,
            error: f64::INFINITY,
            derr: 0.0,
            status: SolverStatus::Seeded,
        }
    }
}

/// Final statistics of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverReport {
    pub status: SolverStatus,
    pub iterations: usize,
    pub error: f64,
    pub derr: f64,
    pub lambda: f64,
}

impl Default for SolverReport {
    fn default() -> Self {
        Self {
            status: SolverStatus::Seeded,
            iterations: 0,
            error: f64::INFINITY,
            derr: 0.0,
            lambda: 0.0,
        }
    }
}

/// Emitted once per step attempt, accepted or not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationEvent {
    pub iteration: usize,
    pub lambda: f64,
    pub error: f64,
    /// `None` when the damped Hessian could not be factorised.
    pub trial_error: Option<f64>,
    pub accepted: bool,
}

/// Hook for watching the solver iterate. Must not influence the run.
pub trait SolverObserver {
    fn on_iteration(&mut self, event: &IterationEvent) {
        let _ = event;
    }
}

impl SolverObserver for () {}
