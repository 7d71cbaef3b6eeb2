//! Glideway command-line entry point.

use clap::Parser;
use glideway::cli::{Cli, Commands};
use glideway::config::EngineSettings;
use glideway::output::print_error;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    glideway::logging::init(cli.verbose, cli.quiet)?;

    let settings = EngineSettings::discover(cli.config.as_deref())?;
    tracing::debug!(?settings, "settings loaded");

    match &cli.command {
        Commands::Ports(cmd) => cmd.execute(settings, cli.quiet).await?,
        Commands::Paths(cmd) => cmd.execute(settings, cli.quiet).await?,
        Commands::Serve(cmd) => cmd.execute(settings).await?,
    }
    Ok(())
}
