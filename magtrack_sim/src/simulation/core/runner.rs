// magtrack_sim/src/simulation/core/runner.rs

use std::time::Duration;

use anyhow::{Context, Result};
use magtrack_core::estimation::{CycleOutput, CycleStatus, PositionEngine, TracingObserver};
use magtrack_core::types::{Position, SensorReadings};
use tracing::{info, info_span};

use crate::simulation::config::ScenarioConfig;
use crate::simulation::core::acquisition::{Acquisition, Frame};
use crate::simulation::core::conditioning::{Baseline, SignalConditioner};
use crate::simulation::core::motion::Trajectory;
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::core::sensors::SyntheticRing;

// =========================================================================
// == Run Summary ==
// =========================================================================

/// Aggregate outcome of one scenario run, scored against the ground truth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub scenario: String,
    pub cycles: usize,
    pub converged: usize,
    pub max_iterations: usize,
    pub ill_conditioned: usize,
    pub out_of_bounds: usize,
    pub degenerate: usize,
    pub reseeds: usize,
    /// Cycles that carried at least one warning.
    pub warned: usize,
    /// Batches the acquisition thread overwrote before the engine took them.
    pub skipped_frames: u64,
    /// Position error over every cycle that kept its estimate (all but `OutOfBounds`).
    pub rms_error: f64,
    pub max_error: f64,
    pub mean_tool_length_error: f64,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            scenario = %self.scenario,
            cycles = self.cycles,
            converged = self.converged,
            max_iterations = self.max_iterations,
            ill_conditioned = self.ill_conditioned,
            out_of_bounds = self.out_of_bounds,
            degenerate = self.degenerate,
            reseeds = self.reseeds,
            warned = self.warned,
            skipped_frames = self.skipped_frames,
            rms_error = self.rms_error,
            max_error = self.max_error,
            mean_tool_length_error = self.mean_tool_length_error,
            "run summary"
        );
    }
}

#[derive(Debug, Default)]
struct SummaryBuilder {
    summary: RunSummary,
    error_sq_sum: f64,
    error_count: usize,
    tool_error_sum: f64,
    tool_error_count: usize,
}

impl SummaryBuilder {
    fn new(scenario: &str) -> Self {
        Self {
            summary: RunSummary {
                scenario: scenario.to_string(),
                ..RunSummary::default()
            },
            ..Self::default()
        }
    }

    fn record(&mut self, output: &CycleOutput, truth: &Position) {
        let s = &mut self.summary;
        s.cycles += 1;
        match output.status {
            CycleStatus::Converged => s.converged += 1,
            CycleStatus::MaxIterationsReached => s.max_iterations += 1,
            CycleStatus::IllConditioned => s.ill_conditioned += 1,
            CycleStatus::OutOfBounds => s.out_of_bounds += 1,
            CycleStatus::DegenerateGeometry => s.degenerate += 1,
        }
        if output.reseeded {
            s.reseeds += 1;
        }
        if !output.warnings.is_empty() {
            s.warned += 1;
        }

        if output.status != CycleStatus::OutOfBounds {
            let error = (output.magnet_position - truth).norm();
            self.error_sq_sum += error * error;
            self.error_count += 1;
            s.max_error = s.max_error.max(error);
        }
        if let Some(tool_error) = output.tool_length_error() {
            self.tool_error_sum += tool_error;
            self.tool_error_count += 1;
        }
    }

    fn finish(mut self) -> RunSummary {
        if self.error_count > 0 {
            self.summary.rms_error = (self.error_sq_sum / self.error_count as f64).sqrt();
        }
        if self.tool_error_count > 0 {
            self.summary.mean_tool_length_error =
                self.tool_error_sum / self.tool_error_count as f64;
        }
        self.summary
    }
}

// =========================================================================
// == Scenario Runner ==
// =========================================================================

/// Samples the ring with the magnet removed and averages the batches.
pub fn calibrate(ring: &SyntheticRing, samples: usize, rng: &mut SimulationRng) -> Result<Baseline> {
    let batches: Vec<SensorReadings> = (0..samples).map(|_| ring.sample(None, rng)).collect();
    Baseline::from_samples(&batches).context("baseline calibration failed")
}

/// Runs a validated scenario end to end and scores it against the ground truth.
pub fn run_scenario(scenario: &ScenarioConfig) -> Result<RunSummary> {
    let span = info_span!("scenario", name = %scenario.simulation.name);
    let _enter = span.enter();

    let mut rng = SimulationRng::new(scenario.simulation.seed);
    let ring = SyntheticRing::new(&scenario.ring, &scenario.engine.dipole, &mut rng)?;
    let baseline = calibrate(&ring, scenario.conditioning.calibration_samples, &mut rng)?;
    let conditioner = SignalConditioner::new(baseline, &scenario.conditioning);
    let engine = PositionEngine::with_observer(
        ring.geometry().clone(),
        scenario.engine.clone(),
        TracingObserver,
    )
    .context("failed to build the position engine")?;
    let trajectory = Trajectory::new(scenario.motion.clone(), scenario.simulation.cycles);

    info!(
        sensors = ring.geometry().len(),
        cycles = scenario.simulation.cycles,
        threaded = scenario.acquisition.threaded,
        "running scenario"
    );

    let mut pipeline = Pipeline {
        engine,
        conditioner,
        builder: SummaryBuilder::new(&scenario.simulation.name),
    };

    if scenario.acquisition.threaded {
        pipeline.run_threaded(scenario, ring, trajectory, rng)?;
    } else {
        pipeline.run_inline(scenario.simulation.cycles, &ring, trajectory, &mut rng)?;
    }

    let summary = pipeline.builder.finish();
    summary.log();
    Ok(summary)
}

struct Pipeline {
    engine: PositionEngine<TracingObserver>,
    conditioner: SignalConditioner,
    builder: SummaryBuilder,
}

impl Pipeline {
    fn step(&mut self, truth: &Position, raw: &SensorReadings) -> Result<()> {
        let calibrated = self.conditioner.condition(raw);
        let output = self.engine.process(&calibrated)?;
        self.builder.record(&output, truth);
        Ok(())
    }

    fn run_inline(
        &mut self,
        cycles: usize,
        ring: &SyntheticRing,
        mut trajectory: Trajectory,
        rng: &mut SimulationRng,
    ) -> Result<()> {
        for _ in 0..cycles {
            let truth = trajectory.next_position(rng);
            let raw = ring.sample(Some(&truth), rng);
            self.step(&truth, &raw)?;
        }
        Ok(())
    }

    fn run_threaded(
        &mut self,
        scenario: &ScenarioConfig,
        ring: SyntheticRing,
        mut trajectory: Trajectory,
        mut rng: SimulationRng,
    ) -> Result<()> {
        let timeout = Duration::from_millis(scenario.acquisition.timeout_ms);
        let acquisition = Acquisition::spawn(scenario.acquisition.rate_hz, move |sequence| {
            let truth = trajectory.next_position(&mut rng);
            let raw = ring.sample(Some(&truth), &mut rng);
            Frame {
                sequence,
                truth,
                raw,
            }
        })?;

        for cycle in 0..scenario.simulation.cycles {
            let frame = acquisition.latest(timeout).with_context(|| {
                format!("no batch from the acquisition thread within {timeout:?} (cycle {cycle})")
            })?;
            self.step(&frame.truth, &frame.raw)?;
        }

        let stats = acquisition.stop()?;
        self.builder.summary.skipped_frames = stats.overwritten;
        Ok(())
    }
}
