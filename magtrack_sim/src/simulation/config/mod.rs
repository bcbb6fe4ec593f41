// magtrack_sim/src/simulation/config/mod.rs

//! Loading and validating scenario files.
//!
//! A scenario is layered: struct defaults, then the TOML file, then any
//! `MAGTRACK_`-prefixed environment variable (`__` separates nesting levels,
//! e.g. `MAGTRACK_ENGINE__SEED__AXIAL_OFFSET=10`).

pub mod structs;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use tracing::{info, warn};
use walkdir::WalkDir;

pub use structs::{
    AcquisitionConfig, ConditioningConfig, MotionPath, RingConfig, ScenarioConfig, Simulation,
};

/// Prefix of the environment variables that override scenario values.
pub const ENV_PREFIX: &str = "MAGTRACK_";

/// The figment used to build a scenario from `path`.
pub fn scenario_figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Loads and validates one scenario file.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig> {
    // Figment treats a missing file as empty, which would silently run the defaults.
    if !path.is_file() {
        bail!("scenario file not found: {}", path.display());
    }

    info!("Loading scenario from: {}", path.display());
    let scenario: ScenarioConfig = scenario_figment(path)
        .extract()
        .with_context(|| format!("failed to parse scenario file {}", path.display()))?;

    scenario
        .validate()
        .with_context(|| format!("invalid scenario {}", path.display()))?;
    Ok(scenario)
}

/// Resolves `--scenario` to the list of files to run.
///
/// A file is returned as-is. A directory is walked recursively and every
/// `.toml` below it is returned in sorted order.
pub fn discover_scenarios(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.is_dir() {
        bail!("scenario path does not exist: {}", root.display());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            found.push(path.to_path_buf());
        }
    }

    if found.is_empty() {
        bail!("no scenario files found under {}", root.display());
    }
    Ok(found)
}
