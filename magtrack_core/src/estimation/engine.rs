// magtrack_core/src/estimation/engine.rs

use tracing::{debug, info, warn};

use super::guard::DivergenceGuard;
use super::ranking::rank_sensors;
use super::seed::initial_guess;
use super::{CycleOutput, CycleStatus, CycleWarning, EngineObserver};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::effector::EndEffectorProjector;
use crate::models::measurement::{DipoleFieldModel, DipoleProblem};
use crate::solver::{LevenbergMarquardt, SolverState, SolverStatus};
use crate::types::{SensorGeometry, SensorReadings, POSITION_DIM};

/// The position estimation engine.
///
/// Owns the ring geometry, the configuration and the solver state that carries
/// over between cycles. Each call to [`PositionEngine::process`] runs the
/// stages in a fixed order: rank, seed (only when there is no warm state),
/// solve, guard, project.
#[derive(Debug)]
pub struct PositionEngine<O: EngineObserver = ()> {
    config: EngineConfig,
    geometry: SensorGeometry,
    model: DipoleFieldModel,
    solver: LevenbergMarquardt,
    guard: DivergenceGuard,
    projector: EndEffectorProjector,
    /// Warm-start state. `None` forces a reseed on the next cycle.
    state: Option<SolverState<POSITION_DIM>>,
    observer: O,
}

impl PositionEngine<()> {
    /// Creates an engine with no observer attached.
    pub fn new(geometry: SensorGeometry, config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_observer(geometry, config, ())
    }
}

impl<O: EngineObserver> PositionEngine<O> {
    pub fn with_observer(
        geometry: SensorGeometry,
        config: EngineConfig,
        observer: O,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if geometry.len() < config.seed.ranked_count {
            return Err(EngineError::InsufficientSensors {
                available: geometry.len(),
                required: config.seed.ranked_count,
            });
        }

        Ok(Self {
            model: DipoleFieldModel::new(&config.dipole),
            solver: LevenbergMarquardt::new(config.solver.clone()),
            guard: DivergenceGuard::new(&config.bounds),
            projector: EndEffectorProjector::new(config.tool.length),
            state: None,
            config,
            geometry,
            observer,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn geometry(&self) -> &SensorGeometry {
        &self.geometry
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// The warm-start state, if the engine currently has a fix to continue from.
    pub fn solver_state(&self) -> Option<&SolverState<POSITION_DIM>> {
        self.state.as_ref()
    }

    /// Drops the warm state so the next cycle starts from a fresh initial guess.
    pub fn reset(&mut self) {
        self.state = None;
    }

    /// Runs one estimation cycle on a batch of calibrated readings.
    ///
    /// Only malformed input is an error. Every solver outcome, including
    /// divergence and a degenerate projection, comes back as a status on the
    /// returned [`CycleOutput`].
    pub fn process(&mut self, readings: &SensorReadings) -> Result<CycleOutput, EngineError> {
        // --- 1. Validate the batch against the ring ---
        if readings.len() != self.geometry.len() {
            return Err(EngineError::SensorCountMismatch {
                expected: self.geometry.len(),
                actual: readings.len(),
            });
        }
        if let Some(sensor) = readings.iter().position(|r| !r.is_finite()) {
            return Err(EngineError::NonFiniteReading { sensor });
        }

        // --- 2. Rank ---
        let norms = readings.norms();
        let ranked = rank_sensors(&norms, self.config.seed.ranked_count)?;

        // --- 3. Seed, or continue from the previous fix ---
        let reseeded = self.state.is_none();
        let mut state = match self.state.take() {
            Some(state) => state,
            None => {
                let seed = initial_guess(&ranked, &self.geometry, self.config.seed.axial_offset)?;
                info!(
                    ranked = ?ranked.as_slice(),
                    x = seed.x,
                    y = seed.y,
                    z = seed.z,
                    "seeding solver from ranked sensors"
                );
                self.observer.on_reseed(&seed);
                SolverState::seeded(seed, self.config.solver.init_lambda)
            }
        };

        // --- 4. Solve ---
        let problem = DipoleProblem::new(
            &self.model,
            &self.geometry,
            &ranked,
            &norms,
            self.config.solver.fd_step,
        )?;
        let report = self.solver.solve(&problem, &mut state, &mut self.observer);
        let magnet_position = state.candidate;

        let mut output = CycleOutput {
            status: CycleStatus::from(report.status),
            ranked,
            magnet_position,
            effector: None,
            report,
            reseeded,
            warnings: Vec::new(),
        };

        // --- 5. Divergence guard ---
        if let Err(violation) = self.guard.check(&magnet_position) {
            warn!(
                axis = violation.axis,
                value = violation.value,
                limit = violation.limit,
                "solution left the working volume; reseeding next cycle"
            );
            output.status = CycleStatus::OutOfBounds;
            self.observer.on_cycle(&output);
            return Ok(output);
        }

        // A run that never found a usable step says the seed itself is bad.
        if report.status == SolverStatus::IllConditioned {
            warn!(
                iterations = report.iterations,
                lambda = report.lambda,
                "damping budget exhausted; reseeding next cycle"
            );
        } else {
            self.state = Some(state);
        }

        // --- 6. Project the end-effector ---
        let projection = self.projector.project(&magnet_position);
        output.status = CycleStatus::after_projection(report.status, projection.is_ok());
        match projection {
            Ok(effector) => {
                if let Some(warning) = effector.check(self.config.tool.length_tolerance) {
                    warn!(
                        tool_length_error = effector.tool_length_error,
                        tolerance = self.config.tool.length_tolerance,
                        "reconstructed tool length is inconsistent"
                    );
                    output.warnings.push(warning);
                }
                output.effector = Some(effector);
            }
            Err(err) => {
                warn!(%err, status = ?output.status, "end-effector projection withheld");
                output.warnings.push(CycleWarning::ProjectionWithheld);
            }
        }

        debug!(
            status = ?output.status,
            iterations = output.report.iterations,
            error = output.report.error,
            "cycle finished"
        );
        self.observer.on_cycle(&output);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{IterationEvent, SolverObserver};
    use crate::types::{Position, SensorReading};
    use approx::assert_abs_diff_eq;

    fn ring() -> SensorGeometry {
        SensorGeometry::new(vec![
            Position::new(0.0, -40.0, 0.0),
            Position::new(40.0, 0.0, 0.0),
            Position::new(0.0, 40.0, 0.0),
            Position::new(-40.0, 0.0, 0.0),
        ])
        .unwrap()
    }

    fn above_ring() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.seed.axial_offset = 10.0;
        config
    }

    /// Readings whose norms follow the dipole model exactly. The field
    /// direction is irrelevant to the engine, so the whole norm goes on z.
    fn readings_for(magnet: &Position, geometry: &SensorGeometry, config: &EngineConfig) -> SensorReadings {
        let model = DipoleFieldModel::new(&config.dipole);
        geometry
            .positions()
            .iter()
            .map(|p| SensorReading::new(0.0, 0.0, model.squared_magnitude(magnet, p).sqrt()))
            .collect()
    }

    #[derive(Debug, Default)]
    struct Counter {
        iterations: usize,
        reseeds: usize,
        cycles: usize,
    }

    impl SolverObserver for Counter {
        fn on_iteration(&mut self, _event: &IterationEvent) {
            self.iterations += 1;
        }
    }

    impl EngineObserver for Counter {
        fn on_reseed(&mut self, _seed: &Position) {
            self.reseeds += 1;
        }
        fn on_cycle(&mut self, _output: &CycleOutput) {
            self.cycles += 1;
        }
    }

    #[test]
    fn first_cycle_seeds_and_converges() {
        let config = above_ring();
        let magnet = Position::new(5.0, 5.0, 50.0);
        let readings = readings_for(&magnet, &ring(), &config);
        let mut engine = PositionEngine::new(ring(), config).unwrap();

        let out = engine.process(&readings).unwrap();

        assert!(out.reseeded);
        assert_eq!(out.status, CycleStatus::Converged);
        assert_eq!(out.ranked.as_slice(), &[0, 1, 2]);
        assert_abs_diff_eq!(out.magnet_position, magnet, epsilon = 1e-6);
        assert!(out.effector.is_some());
        assert!(out.is_trusted());
        assert!(engine.solver_state().is_some());
    }

    #[test]
    fn second_cycle_warm_starts() {
        let config = above_ring();
        let magnet = Position::new(5.0, 5.0, 50.0);
        let readings = readings_for(&magnet, &ring(), &config);
        let mut engine = PositionEngine::new(ring(), config).unwrap();

        let first = engine.process(&readings).unwrap();
        let out = engine.process(&readings).unwrap();

        assert!(!out.reseeded);
        assert_eq!(out.status, CycleStatus::Converged);
        assert!(out.report.iterations < first.report.iterations);
    }

    #[test]
    fn out_of_bounds_discards_fix_and_forces_reseed() {
        let mut config = above_ring();
        // Shrink the volume below the true magnet height.
        config.bounds.half_extents = [500.0, 500.0, 30.0];
        let magnet = Position::new(5.0, 5.0, 50.0);
        let readings = readings_for(&magnet, &ring(), &config);
        let mut engine = PositionEngine::new(ring(), config).unwrap();

        let out = engine.process(&readings).unwrap();
        assert_eq!(out.status, CycleStatus::OutOfBounds);
        assert!(out.effector.is_none());
        assert!(engine.solver_state().is_none());

        let next = engine.process(&readings).unwrap();
        assert!(next.reseeded);
    }

    #[test]
    fn mismatched_batch_is_rejected() {
        let mut engine = PositionEngine::new(ring(), above_ring()).unwrap();
        let readings: SensorReadings = vec![SensorReading::new(1.0, 0.0, 0.0); 3].into_iter().collect();
        assert_eq!(
            engine.process(&readings),
            Err(EngineError::SensorCountMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn non_finite_reading_is_rejected() {
        let mut engine = PositionEngine::new(ring(), above_ring()).unwrap();
        let mut batch = vec![SensorReading::new(1.0, 0.0, 0.0); 4];
        batch[2] = SensorReading::new(0.0, f64::INFINITY, 0.0);
        assert_eq!(
            engine.process(&SensorReadings::new(batch)),
            Err(EngineError::NonFiniteReading { sensor: 2 })
        );
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = above_ring();
        config.solver.max_iterations = 0;
        assert!(matches!(
            PositionEngine::new(ring(), config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn ring_smaller_than_ranking_is_rejected() {
        let mut config = above_ring();
        config.seed.ranked_count = 5;
        assert!(matches!(
            PositionEngine::new(ring(), config),
            Err(EngineError::InsufficientSensors {
                available: 4,
                required: 5
            })
        ));
    }

    #[test]
    fn observer_sees_every_stage() {
        let config = above_ring();
        let readings = readings_for(&Position::new(5.0, 5.0, 50.0), &ring(), &config);
        let mut engine = PositionEngine::with_observer(ring(), config, Counter::default()).unwrap();

        engine.process(&readings).unwrap();
        engine.process(&readings).unwrap();

        let counter = engine.observer();
        assert_eq!(counter.reseeds, 1);
        assert_eq!(counter.cycles, 2);
        assert!(counter.iterations >= 2);
    }

    #[test]
    fn reset_forces_a_fresh_seed() {
        let config = above_ring();
        let readings = readings_for(&Position::new(5.0, 5.0, 50.0), &ring(), &config);
        let mut engine = PositionEngine::new(ring(), config).unwrap();

        engine.process(&readings).unwrap();
        engine.reset();
        assert!(engine.process(&readings).unwrap().reseeded);
    }

    #[test]
    fn consistent_fix_carries_no_geometry_warning() {
        let config = above_ring();
        let readings = readings_for(&Position::new(5.0, 5.0, 50.0), &ring(), &config);
        let mut engine = PositionEngine::new(ring(), config).unwrap();

        let out = engine.process(&readings).unwrap();

        assert_abs_diff_eq!(out.tool_length_error().unwrap(), 0.0, epsilon = 1e-9);
        assert!(!out
            .warnings
            .iter()
            .any(|w| matches!(w, CycleWarning::GeometryInconsistent { .. })));
    }
}
