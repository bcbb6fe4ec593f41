// magtrack_core/src/lib.rs

// Public modules of the position estimation library.
pub mod config;
pub mod error;
pub mod estimation;
pub mod models;
pub mod prelude;
pub mod solver;
pub mod types;
