// magtrack_sim/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

use crate::logging::LogFormat;
use crate::simulation::config::ScenarioConfig;

/// MagTrack: synthetic runs of the magnet position estimation engine.
///
/// Each scenario file describes a sensor ring, a magnet path and the engine
/// configuration; the run scores every cycle against the ground truth.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// A scenario TOML file, or a directory searched recursively for them.
    #[arg(short, long, default_value = "assets/scenarios")]
    pub scenario: PathBuf,

    /// Override the number of engine cycles.
    #[arg(long)]
    pub cycles: Option<usize>,

    /// Override the PRNG seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Sample the ring on a background acquisition thread.
    #[arg(long, default_value_t = false)]
    pub threaded: bool,

    /// Print the default scenario as TOML and exit.
    #[arg(long, default_value_t = false)]
    pub print_default_config: bool,
}

impl Cli {
    /// Applies the command-line overrides on top of a loaded scenario.
    pub fn apply_overrides(&self, scenario: &mut ScenarioConfig) {
        if let Some(cycles) = self.cycles {
            scenario.simulation.cycles = cycles;
        }
        if let Some(seed) = self.seed {
            scenario.simulation.seed = Some(seed);
        }
        if self.threaded {
            scenario.acquisition.threaded = true;
        }
    }
}
