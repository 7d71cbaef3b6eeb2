//! Serve subcommand: a JSON lines bridge over stdio.
//!
//! Each stdin line is a [`Command`]; each reply is written as one JSON line
//! on stdout, interleaved with event envelopes as jobs emit them. EOF on
//! stdin stops running jobs and exits once they are idle.

use crate::config::EngineSettings;
use crate::error::CliResult;
use crate::events::ChannelSink;
use crate::output::envelope;
use crate::service::{Command, ScanService};
use clap::Parser;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Serve commands over stdin/stdout.
#[derive(Parser, Debug)]
pub struct ServeCommand {}

impl ServeCommand {
    /// Execute the serve command.
    pub async fn execute(&self, settings: EngineSettings) -> CliResult<()> {
        let (sink, mut events) = ChannelSink::channel();
        let service = ScanService::new(settings, Arc::new(sink));
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        tracing::info!("serving commands on stdin");
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let reply = handle_line(&service, &line).await;
                    write_line(&mut stdout, &reply).await?;
                }
                Some(event) = events.recv() => {
                    write_line(&mut stdout, &envelope(&event)).await?;
                }
            }
        }

        service.shutdown().await;
        while let Ok(event) = events.try_recv() {
            write_line(&mut stdout, &envelope(&event)).await?;
        }
        Ok(())
    }
}

/// Parse and dispatch one command line.
async fn handle_line(service: &ScanService, line: &str) -> Value {
    let command: Command = match serde_json::from_str(line) {
        Ok(command) => command,
        Err(e) => return json!({ "error": format!("invalid command: {}", e) }),
    };

    match service.dispatch(command).await {
        Ok(reply) => serde_json::to_value(reply).unwrap_or_else(|e| json!({ "error": e.to_string() })),
        Err(e) => json!({ "error": e.to_string() }),
    }
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, value: &Value) -> CliResult<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    out.write_all(&line).await?;
    out.flush().await?;
    Ok(())
}
