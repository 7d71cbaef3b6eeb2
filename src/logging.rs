//! Diagnostic logging setup.
//!
//! Logs go to stderr so they never interleave with results on stdout.
//! `RUST_LOG` overrides the level picked from the command-line flags.

use anyhow::anyhow;
use std::io;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Default level for the given verbosity flags.
pub fn level_for(verbose: bool, quiet: bool) -> Level {
    if quiet {
        Level::WARN
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Install the global subscriber.
pub fn init(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level_for(verbose, quiet)).into())
        .from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!(e))?;

    tracing::debug!("logging initialized");
    Ok(())
}
