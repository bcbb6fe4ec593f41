// magtrack_sim/src/simulation/core/conditioning.rs

//! Turns raw ring batches into the calibrated readings the engine expects.

use anyhow::{bail, ensure, Result};
use magtrack_core::types::{SensorReading, SensorReadings};
use nalgebra::Vector3;

use crate::simulation::config::ConditioningConfig;

/// Per-sensor field measured with the magnet absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline(Vec<Vector3<f64>>);

impl Baseline {
    /// Averages a set of magnet-free batches sensor by sensor.
    pub fn from_samples(samples: &[SensorReadings]) -> Result<Self> {
        let Some(first) = samples.first() else {
            bail!("baseline needs at least one sample");
        };
        let n = first.len();
        ensure!(
            samples.iter().all(|s| s.len() == n),
            "baseline samples disagree on the sensor count"
        );

        let mut sum = vec![Vector3::zeros(); n];
        for batch in samples {
            for (acc, reading) in sum.iter_mut().zip(batch.iter()) {
                *acc += reading.field;
            }
        }
        let count = samples.len() as f64;
        Ok(Self(sum.into_iter().map(|s| s / count).collect()))
    }

    pub fn offsets(&self) -> &[Vector3<f64>] {
        &self.0
    }

    /// Calibrated = raw − baseline.
    pub fn subtract(&self, raw: &SensorReadings) -> SensorReadings {
        raw.iter()
            .zip(&self.0)
            .map(|(r, b)| SensorReading::from(r.field - b))
            .collect()
    }
}

/// Exponential moving average over whole batches.
#[derive(Debug, Clone)]
pub struct EmaFilter {
    alpha: f64,
    state: Option<Vec<Vector3<f64>>>,
}

impl EmaFilter {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, state: None }
    }

    /// The first batch passes through; later ones are blended as
    /// `alpha·new + (1 − alpha)·previous`.
    pub fn apply(&mut self, batch: &SensorReadings) -> SensorReadings {
        let alpha = self.alpha;
        let next: Vec<Vector3<f64>> = match &self.state {
            Some(prev) if prev.len() == batch.len() => batch
                .iter()
                .zip(prev)
                .map(|(r, p)| r.field * alpha + p * (1.0 - alpha))
                .collect(),
            _ => batch.iter().map(|r| r.field).collect(),
        };
        let out = next.iter().copied().map(SensorReading::from).collect();
        self.state = Some(next);
        out
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Baseline subtraction followed by smoothing.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    baseline: Baseline,
    ema: EmaFilter,
}

impl SignalConditioner {
    pub fn new(baseline: Baseline, config: &ConditioningConfig) -> Self {
        Self {
            baseline,
            ema: EmaFilter::new(config.alpha),
        }
    }

    pub fn condition(&mut self, raw: &SensorReadings) -> SensorReadings {
        self.ema.apply(&self.baseline.subtract(raw))
    }
}
