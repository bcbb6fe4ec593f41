// magtrack_core/src/models/measurement/mod.rs

//! Measurement models: how a candidate magnet position maps onto what the
//! ring sensors should read.

pub mod dipole;

pub use dipole::{DipoleFieldModel, DipoleProblem};
