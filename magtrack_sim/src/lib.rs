// magtrack_sim/src/lib.rs

// This prelude is for convenience for other files WITHIN the magtrack_sim crate.
pub mod prelude;

pub mod cli;
pub mod logging;
// Synthetic collaborators that drive the engine: ring, conditioning, motion, acquisition.
pub mod simulation;
