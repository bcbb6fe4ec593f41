// magtrack_core/src/models/mod.rs

pub mod effector;
pub mod measurement;
