// magtrack_core/src/solver/levmarq.rs

use nalgebra::{SMatrix, SVector};

use super::cholesky::Cholesky;
use super::{
    chi_squared, IterationEvent, LeastSquaresProblem, SolverObserver, SolverReport, SolverState,
    SolverStatus,
};
use crate::config::SolverConfig;

/// A damped Gauss-Newton (Levenberg-Marquardt) minimiser.
///
/// Each iteration builds the Gauss-Newton normal equations, scales the Hessian
/// diagonal by `1 + λ`, and solves them with a Cholesky factorisation. A step is
/// kept only if it does not increase the error; otherwise λ grows and the same
/// linearisation is retried. Every retry spends one iteration of the budget.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: SolverConfig,
}

impl LevenbergMarquardt {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Refines `state.candidate` in place, starting from `state.lambda`.
    ///
    /// The candidate is only ever replaced by an accepted step, so whatever the
    /// outcome `state.candidate` holds the best parameters seen.
    pub fn solve<P, const M: usize>(
        &self,
        problem: &P,
        state: &mut SolverState<M>,
        observer: &mut dyn SolverObserver,
    ) -> SolverReport
    where
        P: LeastSquaresProblem<M> + ?Sized,
    {
        let max_it = self.config.max_iterations;
        let up = self.config.up_factor;
        let down = 1.0 / self.config.down_factor;

        let mut lambda = state.lambda.max(self.config.min_lambda);
        let mut err = chi_squared(problem, &state.candidate);
        let mut derr = 0.0;
        let mut it = 0;
        let mut status = SolverStatus::MaxIterationsReached;

        state.status = SolverStatus::Iterating;

        while it < max_it {
            let (hessian, d) = normal_equations(problem, &state.candidate);

            // Make a step; if it is rejected, increase lambda and try again.
            let mut accepted = None;
            while it < max_it {
                let mut damped = hessian;
                for i in 0..M {
                    damped[(i, i)] *= 1.0 + lambda;
                }

                let trial = Cholesky::decompose(&damped).ok().map(|chol| {
                    let params = state.candidate + chol.solve(&d);
                    (params, chi_squared(problem, &params))
                });
                // NaN compares false, so a non-finite trial is rejected here.
                let ok = matches!(trial, Some((_, new_err)) if new_err <= err);

                let event = IterationEvent {
                    iteration: it,
                    lambda,
                    error: err,
                    trial_error: trial.map(|(_, e)| e),
                    accepted: ok,
                };
                observer.on_iteration(&event);

                if ok {
                    accepted = trial;
                    break;
                }
                lambda *= up;
                it += 1;
            }

            let Some((params, new_err)) = accepted else {
                status = SolverStatus::IllConditioned;
                break;
            };

            derr = new_err - err;
            state.candidate = params;
            err = new_err;
            lambda = (lambda * down).max(self.config.min_lambda);
            it += 1;

            if -derr < self.config.target_derr {
                status = SolverStatus::Converged;
                break;
            }
        }

        state.lambda = lambda;
        state.iterations = it;
        state.error = err;
        state.derr = derr;
        state.status = status;

        SolverReport {
            status,
            iterations: it,
            error: err,
            derr,
            lambda,
        }
    }
}

/// Gauss-Newton approximation of the Hessian, `H = Σ w·g·gᵀ`, and the
/// projected residual `d = Σ w·(y − f)·g`.
///
/// Only the lower triangle of `H` is filled; the Cholesky factorisation never
/// looks above the diagonal.
fn normal_equations<P, const M: usize>(
    problem: &P,
    params: &SVector<f64, M>,
) -> (SMatrix<f64, M, M>, SVector<f64, M>)
where
    P: LeastSquaresProblem<M> + ?Sized,
{
    let mut h = SMatrix::<f64, M, M>::zeros();
    let mut d = SVector::<f64, M>::zeros();

    for x in 0..problem.num_measurements() {
        let weight = problem.weight(x);
        let g = problem.gradient(params, x);
        let residual = problem.observation(x) - problem.evaluate(params, x);
        for i in 0..M {
            d[i] += residual * g[i] * weight;
            for j in 0..=i {
                h[(i, j)] += g[i] * g[j] * weight;
            }
        }
    }

    (h, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Vector2, Vector3};

    /// y = a·exp(-b·t), sampled without noise.
    struct ExpDecay {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl ExpDecay {
        fn new(a: f64, b: f64) -> Self {
            let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
            let y = t.iter().map(|t| a * (-b * t).exp()).collect();
            Self { t, y }
        }
    }

    impl LeastSquaresProblem<2> for ExpDecay {
        fn num_measurements(&self) -> usize {
            self.t.len()
        }
        fn observation(&self, index: usize) -> f64 {
            self.y[index]
        }
        fn evaluate(&self, p: &Vector2<f64>, index: usize) -> f64 {
            p[0] * (-p[1] * self.t[index]).exp()
        }
    }

    /// y = a + b·t with an analytic gradient.
    struct Line {
        t: Vec<f64>,
        y: Vec<f64>,
        variances: Option<Vec<f64>>,
    }

    impl LeastSquaresProblem<2> for Line {
        fn num_measurements(&self) -> usize {
            self.t.len()
        }
        fn observation(&self, index: usize) -> f64 {
            self.y[index]
        }
        fn evaluate(&self, p: &Vector2<f64>, index: usize) -> f64 {
            p[0] + p[1] * self.t[index]
        }
        fn gradient(&self, _p: &Vector2<f64>, index: usize) -> Vector2<f64> {
            Vector2::new(1.0, self.t[index])
        }
        fn variance(&self, index: usize) -> Option<f64> {
            self.variances.as_ref().map(|v| v[index])
        }
    }

    /// A model whose output never depends on the parameters: `H` is always zero.
    struct Flat;

    impl LeastSquaresProblem<3> for Flat {
        fn num_measurements(&self) -> usize {
            4
        }
        fn observation(&self, _index: usize) -> f64 {
            1.0
        }
        fn evaluate(&self, _p: &Vector3<f64>, _index: usize) -> f64 {
            0.0
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<IterationEvent>);

    impl SolverObserver for Recorder {
        fn on_iteration(&mut self, event: &IterationEvent) {
            self.0.push(*event);
        }
    }

    fn line() -> Line {
        let t: Vec<f64> = (0..6).map(f64::from).collect();
        let y = t.iter().map(|t| 2.0 + 0.5 * t).collect();
        Line {
            t,
            y,
            variances: None,
        }
    }

    #[test]
    fn recovers_exponential_decay_parameters() {
        let problem = ExpDecay::new(3.0, 0.7);
        let solver = LevenbergMarquardt::default();
        let mut state = SolverState::seeded(Vector2::new(1.0, 0.2), 1e-4);

        let report = solver.solve(&problem, &mut state, &mut ());

        assert_eq!(report.status, SolverStatus::Converged);
        assert_abs_diff_eq!(state.candidate, Vector2::new(3.0, 0.7), epsilon = 1e-6);
        assert!(report.error < 1e-12);
        assert_eq!(state.status, SolverStatus::Converged);
    }

    #[test]
    fn error_never_increases_between_accepted_steps() {
        let problem = ExpDecay::new(3.0, 0.7);
        let solver = LevenbergMarquardt::default();
        let mut state = SolverState::seeded(Vector2::new(1.0, 0.2), 1e-4);
        let mut recorder = Recorder::default();

        solver.solve(&problem, &mut state, &mut recorder);

        let accepted: Vec<f64> = recorder
            .0
            .iter()
            .filter(|e| e.accepted)
            .filter_map(|e| e.trial_error)
            .collect();
        assert!(!accepted.is_empty());
        assert!(accepted.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn budget_exhausted_between_steps_is_max_iterations() {
        let problem = line();
        let solver = LevenbergMarquardt::new(SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        });
        let mut state = SolverState::seeded(Vector2::zeros(), 1e-4);

        let report = solver.solve(&problem, &mut state, &mut ());

        assert_eq!(report.status, SolverStatus::MaxIterationsReached);
        assert_eq!(report.iterations, 1);
        // The single accepted step is kept.
        assert_abs_diff_eq!(state.candidate, Vector2::new(2.0, 0.5), epsilon = 1e-3);
    }

    #[test]
    fn budget_exhausted_while_damping_is_ill_conditioned() {
        let solver = LevenbergMarquardt::new(SolverConfig {
            max_iterations: 25,
            ..SolverConfig::default()
        });
        let start = Vector3::new(1.0, 2.0, 3.0);
        let mut state = SolverState::seeded(start, 1e-4);
        let mut recorder = Recorder::default();

        let report = solver.solve(&Flat, &mut state, &mut recorder);

        assert_eq!(report.status, SolverStatus::IllConditioned);
        assert_eq!(report.iterations, 25);
        assert_eq!(state.candidate, start);
        assert!(recorder.0.iter().all(|e| !e.accepted && e.trial_error.is_none()));
        // λ grew by the up-factor on every retry.
        assert!(report.lambda > 1e-4 * 1e20);
    }

    #[test]
    fn weighted_error_scales_by_inverse_variance() {
        let mut problem = line();
        let params = Vector2::new(2.0, 0.0);
        let unweighted = chi_squared(&problem, &params);
        problem.variances = Some(vec![4.0; 6]);
        let weighted = chi_squared(&problem, &params);
        assert_abs_diff_eq!(weighted, unweighted / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn weighted_fit_still_finds_exact_line() {
        let mut problem = line();
        problem.variances = Some(vec![0.5, 1.0, 2.0, 4.0, 8.0, 16.0]);
        let solver = LevenbergMarquardt::default();
        let mut state = SolverState::seeded(Vector2::new(-1.0, 3.0), 1e-4);

        let report = solver.solve(&problem, &mut state, &mut ());

        assert_eq!(report.status, SolverStatus::Converged);
        assert_abs_diff_eq!(state.candidate, Vector2::new(2.0, 0.5), epsilon = 1e-8);
    }

    #[test]
    fn warm_state_at_optimum_converges_immediately() {
        let problem = line();
        let solver = LevenbergMarquardt::default();
        let mut state = SolverState::seeded(Vector2::new(2.0, 0.5), 1e-4);

        let report = solver.solve(&problem, &mut state, &mut ());

        assert_eq!(report.status, SolverStatus::Converged);
        assert_eq!(report.iterations, 1);
        assert_abs_diff_eq!(report.error, 0.0, epsilon = 1e-20);
    }

    #[test]
    fn lambda_never_drops_below_floor() {
        let problem = line();
        let solver = LevenbergMarquardt::new(SolverConfig {
            min_lambda: 1e-6,
            ..SolverConfig::default()
        });
        let mut state = SolverState::seeded(Vector2::zeros(), 1e-4);

        let report = solver.solve(&problem, &mut state, &mut ());

        assert!(report.lambda >= 1e-6);
        assert!(state.lambda >= 1e-6);
    }
}
