//! CLI subcommand definitions and handlers.
//!
//! - `glideway ports <target>` - Scan a host for open ports
//! - `glideway paths <url> -w <wordlist>` - Probe a web server for paths
//! - `glideway serve` - Drive the engine with JSON lines over stdio

mod paths;
mod ports;
mod serve;

pub use paths::PathsCommand;
pub use ports::PortsCommand;
pub use serve::ServeCommand;

use crate::error::{CliError, CliResult};
use crate::events::ScanEvent;
use crate::job::{JobKind, ScanStatus};
use crate::output::Renderer;
use crate::service::ScanService;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Glideway - concurrent port and web path scanner.
///
/// Scans a host for open TCP ports with service fingerprinting, or a web
/// server for existing paths from a wordlist.
#[derive(Parser, Debug)]
#[command(name = "glideway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Concurrent port and web path scanner", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to custom settings file
    #[arg(long, global = true, value_name = "PATH", env = "GLIDEWAY_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a host for open ports
    #[command(alias = "p")]
    Ports(PortsCommand),

    /// Probe a web server for paths from a wordlist
    #[command(alias = "d")]
    Paths(PathsCommand),

    /// Read JSON commands on stdin, write replies and events on stdout
    Serve(ServeCommand),
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable plain text
    #[default]
    Plain,
    /// One JSON event per line
    Json,
    /// CSV rows of found items
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Render a started job's events until it is idle again.
///
/// Ctrl-C requests a stop once; the job still drains before this returns.
async fn drive(
    service: &ScanService,
    kind: JobKind,
    mut events: mpsc::UnboundedReceiver<ScanEvent>,
    renderer: &mut dyn Renderer,
) -> CliResult<()> {
    let mut failure = None;
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                renderer.render(&event)?;
                match &event {
                    ScanEvent::Error { message, .. } => failure = Some(message.clone()),
                    ScanEvent::Status { status: ScanStatus::Idle, .. } => break,
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                tracing::info!(%kind, "interrupt received, stopping");
                if let Err(e) = service.stop(kind) {
                    tracing::debug!(error = %e, "stop after interrupt");
                }
            }
        }
    }

    renderer.finish()?;
    match failure {
        Some(message) => Err(CliError::JobFailed(message)),
        None => Ok(()),
    }
}

/// Concurrency from the flag, else the configured default.
fn concurrency_or(flag: Option<i64>, default: usize) -> i64 {
    flag.unwrap_or_else(|| i64::try_from(default).unwrap_or(i64::MAX))
}
