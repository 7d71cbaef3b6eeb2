//! Paths subcommand implementation.
//!
//! Handles the `glideway paths <url> -w <wordlist>` command.

use crate::cli::OutputFormat;
use crate::config::EngineSettings;
use crate::error::CliResult;
use crate::events::ChannelSink;
use crate::job::JobKind;
use crate::output;
use crate::scanner::AcceptedStatusSet;
use crate::service::{PathScanParams, ScanService};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// Probe a web server for paths from a wordlist.
#[derive(Parser, Debug)]
pub struct PathsCommand {
    /// Base URL (http:// is assumed when no scheme is given)
    #[arg(value_name = "URL")]
    pub target: String,

    /// Wordlist file, one path per line
    #[arg(short = 'w', long, value_name = "FILE")]
    pub wordlist: PathBuf,

    /// Maximum number of concurrent requests
    #[arg(short = 'c', long)]
    pub concurrency: Option<i64>,

    /// Status codes counted as found (e.g. "200,301,403")
    #[arg(long, value_name = "CODES")]
    pub status: Option<AcceptedStatusSet>,

    /// Rate limit in requests per second (0 = unlimited)
    #[arg(short = 'r', long = "rate")]
    pub rate_limit: Option<u32>,

    /// Output format for results
    #[arg(short, long, value_enum, default_value = "plain")]
    pub output: OutputFormat,
}

impl PathsCommand {
    pub fn params(&self, settings: &EngineSettings) -> PathScanParams {
        let mut params = PathScanParams::new(
            self.target.clone(),
            self.wordlist.clone(),
            super::concurrency_or(self.concurrency, settings.default_path_concurrency),
        );
        params.accepted_status = self.status.clone();
        params.rate_limit = self.rate_limit;
        params
    }

    /// Execute the paths command.
    pub async fn execute(&self, settings: EngineSettings, quiet: bool) -> CliResult<()> {
        let params = self.params(&settings);
        let (sink, events) = ChannelSink::channel();
        let service = ScanService::new(settings, Arc::new(sink));

        service.start_path_scan(params).await?;

        let mut renderer = output::renderer(self.output, JobKind::PathScan, &self.target, quiet);
        super::drive(&service, JobKind::PathScan, events, renderer.as_mut()).await
    }
}
