// magtrack_sim/src/main.rs

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};

use magtrack_sim::cli::Cli;
use magtrack_sim::logging::init_logging;
use magtrack_sim::prelude::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        let text = toml::to_string_pretty(&ScenarioConfig::default())
            .context("failed to serialize the default scenario")?;
        print!("{text}");
        return Ok(());
    }

    init_logging(&cli.log_level, cli.log_format)?;

    let paths = discover_scenarios(&cli.scenario)?;
    info!("Found {} scenario(s) under {}", paths.len(), cli.scenario.display());

    let mut failed = 0;
    for path in &paths {
        let result = load_scenario(path).and_then(|mut scenario| {
            cli.apply_overrides(&mut scenario);
            run_scenario(&scenario)
        });
        if let Err(e) = result {
            error!("Scenario {} failed: {:#}", path.display(), e);
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} scenario(s) failed", paths.len());
    }
    Ok(())
}
