// magtrack_sim/src/simulation/core/mod.rs

pub mod acquisition;
pub mod conditioning;
pub mod motion;
pub mod prng;
pub mod runner;
pub mod sensors;
