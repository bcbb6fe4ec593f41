// magtrack_sim/src/logging.rs

//! Installs the global `tracing` subscriber for the simulator binary.
//!
//! `RUST_LOG` wins when set; otherwise the `--log-level` directive applies.
//! Events go to stderr so stdout stays free for `--print-default-config`.

use anyhow::{Context, Result};
use clap::ValueEnum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// One line per event.
    #[default]
    Compact,
    /// Multi-line, human-readable.
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

/// Builds the filter from `RUST_LOG`, falling back to `level`
/// (any `EnvFilter` directive, e.g. `info` or `magtrack_core=trace`).
pub fn build_filter(level: &str) -> Result<EnvFilter> {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    resolve_filter(from_env.as_deref(), level)
}

/// A parseable `env` directive wins; otherwise `level` must parse.
fn resolve_filter(env: Option<&str>, level: &str) -> Result<EnvFilter> {
    if let Some(filter) = env.and_then(|directive| EnvFilter::try_new(directive).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(level).with_context(|| format!("invalid log filter directive '{level}'"))
}

/// Initialises logging once at startup. A second call fails.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = build_filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.context("failed to install the tracing subscriber")
}
