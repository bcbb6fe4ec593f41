// magtrack_sim/src/simulation/core/sensors.rs

use anyhow::{Context, Result};
use magtrack_core::config::DipoleConfig;
use magtrack_core::types::{Position, SensorGeometry, SensorReading, SensorReadings};
use nalgebra::Vector3;
use rand_distr::{Distribution, Normal};

use crate::simulation::config::RingConfig;
use crate::simulation::core::prng::SimulationRng;

// =========================================================================
// == Synthetic Sensor Ring ==
// =========================================================================

/// A ring of 3-axis magnetometers looking at an axially magnetised dipole.
///
/// Every reading is the dipole field plus a fixed per-sensor ambient offset
/// plus white noise. Calibration is expected to remove the offset.
#[derive(Debug, Clone)]
pub struct SyntheticRing {
    geometry: SensorGeometry,
    /// √K in G·m³.
    moment: f64,
    meters_per_unit: f64,
    ambient: Vec<Vector3<f64>>,
    noise: Normal<f64>,
}

impl SyntheticRing {
    pub fn new(config: &RingConfig, dipole: &DipoleConfig, rng: &mut SimulationRng) -> Result<Self> {
        let positions = config
            .sensors
            .iter()
            .map(|p| Position::new(p[0], p[1], p[2]))
            .collect();
        let geometry = SensorGeometry::new(positions).context("invalid sensor ring")?;

        let spread = Normal::new(0.0, config.ambient_spread).context("invalid ambient spread")?;
        let base = Vector3::from(config.ambient);
        let ambient = (0..geometry.len())
            .map(|_| base + Vector3::from_fn(|_, _| spread.sample(&mut rng.0)))
            .collect();

        Ok(Self {
            geometry,
            moment: dipole.k.sqrt(),
            meters_per_unit: dipole.meters_per_unit,
            ambient,
            noise: Normal::new(0.0, config.noise_stddev).context("invalid noise stddev")?,
        })
    }

    pub fn geometry(&self) -> &SensorGeometry {
        &self.geometry
    }

    /// The ambient offset each sensor adds to every reading.
    pub fn ambient(&self) -> &[Vector3<f64>] {
        &self.ambient
    }

    /// Noise-free dipole field at `sensor` for a magnet at `magnet`, in Gauss.
    ///
    /// `B = √K / r³ · (3(ẑ·r̂)r̂ − ẑ)`, so `|B|²` is exactly the engine's model.
    pub fn dipole_field(&self, magnet: &Position, sensor: &Position) -> Vector3<f64> {
        let r = (sensor - magnet) * self.meters_per_unit;
        let distance = r.norm();
        let r_hat = r / distance;
        let z_hat = Vector3::z();
        (r_hat * (3.0 * r_hat.z) - z_hat) * (self.moment / distance.powi(3))
    }

    /// One raw batch. `None` samples the ring with the magnet removed.
    pub fn sample(&self, magnet: Option<&Position>, rng: &mut SimulationRng) -> SensorReadings {
        self.geometry
            .positions()
            .iter()
            .zip(&self.ambient)
            .map(|(sensor, ambient)| {
                let field = magnet.map_or_else(Vector3::zeros, |m| self.dipole_field(m, sensor));
                let noise = Vector3::from_fn(|_, _| self.noise.sample(&mut rng.0));
                SensorReading::from(field + ambient + noise)
            })
            .collect()
    }
}
