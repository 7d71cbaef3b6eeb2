//! Ports subcommand implementation.
//!
//! Handles the `glideway ports <target>` command.

use crate::cli::OutputFormat;
use crate::config::EngineSettings;
use crate::error::CliResult;
use crate::events::ChannelSink;
use crate::job::JobKind;
use crate::output;
use crate::service::{PortScanParams, ScanService};
use clap::Parser;
use std::sync::Arc;

/// Scan a host for open TCP ports.
#[derive(Parser, Debug)]
pub struct PortsCommand {
    /// Target to scan (IP address or hostname)
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// First port of the range
    #[arg(short = 's', long = "start", default_value_t = 1)]
    pub start_port: u32,

    /// Last port of the range
    #[arg(short = 'e', long = "end", default_value_t = 1024)]
    pub end_port: u32,

    /// Maximum number of concurrent probes
    #[arg(short = 'c', long)]
    pub concurrency: Option<i64>,

    /// Skip service fingerprinting of open ports
    #[arg(long)]
    pub no_fingerprint: bool,

    /// Rate limit in probes per second (0 = unlimited)
    #[arg(short = 'r', long = "rate")]
    pub rate_limit: Option<u32>,

    /// Output format for results
    #[arg(short, long, value_enum, default_value = "plain")]
    pub output: OutputFormat,
}

impl PortsCommand {
    pub fn params(&self, settings: &EngineSettings) -> PortScanParams {
        let mut params = PortScanParams::new(
            self.target.clone(),
            self.start_port,
            self.end_port,
            super::concurrency_or(self.concurrency, settings.default_concurrency),
        );
        if self.no_fingerprint {
            params.fingerprint = Some(false);
        }
        params.rate_limit = self.rate_limit;
        params
    }

    /// Execute the ports command.
    pub async fn execute(&self, settings: EngineSettings, quiet: bool) -> CliResult<()> {
        let params = self.params(&settings);
        let (sink, events) = ChannelSink::channel();
        let service = ScanService::new(settings, Arc::new(sink));

        service.start_port_scan(params).await?;

        let mut renderer = output::renderer(self.output, JobKind::PortScan, &self.target, quiet);
        super::drive(&service, JobKind::PortScan, events, renderer.as_mut()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_params_from_flags() {
        let cmd = PortsCommand::parse_from(["ports", "localhost", "--no-fingerprint", "-r", "100"]);
        let params = cmd.params(&EngineSettings::default());
        assert_eq!(params.start_port, 1);
        assert_eq!(params.end_port, 1024);
        assert_eq!(params.max_concurrency, 500);
        assert_eq!(params.fingerprint, Some(false));
        assert_eq!(params.rate_limit, Some(100));
    }
}
