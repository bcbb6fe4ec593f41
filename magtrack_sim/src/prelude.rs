// magtrack_sim/src/prelude.rs

// Re-export the entire magtrack_core prelude so the engine types are at hand.
pub use magtrack_core::prelude::*;

// Re-export common simulation-specific types.
pub use crate::simulation::config::structs::*;
pub use crate::simulation::config::{discover_scenarios, load_scenario};
pub use crate::simulation::core::acquisition::{Acquisition, Frame, LatestReadings};
pub use crate::simulation::core::conditioning::{Baseline, EmaFilter, SignalConditioner};
pub use crate::simulation::core::motion::Trajectory;
pub use crate::simulation::core::prng::SimulationRng;
pub use crate::simulation::core::runner::{run_scenario, RunSummary};
pub use crate::simulation::core::sensors::SyntheticRing;
