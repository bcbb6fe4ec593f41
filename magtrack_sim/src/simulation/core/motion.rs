// magtrack_sim/src/simulation/core/motion.rs

use std::f64::consts::TAU;

use magtrack_core::types::Position;
use nalgebra::Vector3;
use rand::Rng;

use crate::simulation::config::MotionPath;
use crate::simulation::core::prng::SimulationRng;

/// Ground-truth magnet positions, one per cycle.
#[derive(Debug, Clone)]
pub struct Trajectory {
    path: MotionPath,
    cycles: usize,
    step: usize,
    /// Last position handed out; only the random walk depends on it.
    current: Option<Position>,
}

impl Trajectory {
    /// `cycles` is the length the deterministic paths are stretched over.
    /// Sampling past it holds the final position.
    pub fn new(path: MotionPath, cycles: usize) -> Self {
        Self {
            path,
            cycles,
            step: 0,
            current: None,
        }
    }

    /// Normalised progress along the path, in [0, 1].
    fn progress(&self) -> f64 {
        if self.cycles <= 1 {
            return 0.0;
        }
        (self.step as f64 / (self.cycles - 1) as f64).min(1.0)
    }

    pub fn next_position(&mut self, rng: &mut SimulationRng) -> Position {
        let t = self.progress();
        let position = match &self.path {
            MotionPath::Static { position } => Vector3::from(*position),
            MotionPath::Helix {
                center,
                radius,
                z_start,
                z_end,
                turns,
            } => {
                let angle = TAU * turns * t;
                Position::new(
                    center[0] + radius * angle.cos(),
                    center[1] + radius * angle.sin(),
                    z_start + (z_end - z_start) * t,
                )
            }
            MotionPath::Line { from, to } => {
                let from = Vector3::from(*from);
                from + (Vector3::from(*to) - from) * t
            }
            MotionPath::RandomWalk {
                start,
                step,
                limits,
            } => {
                let start = Vector3::from(*start);
                match self.current {
                    None => start,
                    Some(previous) => Position::from_fn(|i, _| {
                        let moved = previous[i] + rng.0.gen_range(-*step..=*step);
                        moved.clamp(start[i] - limits[i], start[i] + limits[i])
                    }),
                }
            }
        };

        self.step += 1;
        self.current = Some(position);
        position
    }
}
