//! Plain text output formatting.
//!
//! Produces human-readable output with colors and a live progress bar.

use super::Renderer;
use crate::error::CliResult;
use crate::events::{ScanEvent, ScanSummary};
use crate::job::{JobKind, ScanStatus};
use crate::progress::{ProgressSnapshot, ProgressStatus};
use crate::scanner::{PathResult, PortResult, UNKNOWN};
use console::{style, Style};
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Human-readable renderer.
pub struct PlainRenderer {
    kind: JobKind,
    target: String,
    quiet: bool,
    bar: Option<ProgressBar>,
}

impl PlainRenderer {
    pub fn new(kind: JobKind, target: &str, quiet: bool) -> Self {
        Self {
            kind,
            target: target.to_string(),
            quiet,
            bar: None,
        }
    }

    /// Print above the bar if there is one.
    fn line(&self, text: String) {
        match &self.bar {
            Some(bar) => bar.println(text),
            None => println!("{}", text),
        }
    }

    fn progress(&mut self, snapshot: &ProgressSnapshot) {
        if self.quiet {
            return;
        }

        if self.bar.is_none() && snapshot.status == ProgressStatus::Scanning {
            print_scan_header(self.kind, &self.target, snapshot.total);
            let bar = ProgressBar::new(snapshot.total);
            if let Ok(bar_style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
                bar.set_style(bar_style.progress_chars("=>-"));
            }
            self.bar = Some(bar);
        }

        if let Some(bar) = &self.bar {
            bar.set_length(snapshot.total);
            bar.set_position(snapshot.scanned);
            bar.set_message(match snapshot.status {
                ProgressStatus::Scanning => format!("{:.0}/s", snapshot.speed),
                other => other.to_string(),
            });
            if snapshot.status.is_terminal() {
                bar.finish_and_clear();
            }
        }
    }

    fn summary(&self, summary: &ScanSummary) {
        if self.quiet {
            return;
        }
        self.line(format!(
            "\n  {} {} items scanned in {:.2}s, {} found",
            style("Statistics:").bold(),
            summary.scanned,
            summary.duration_ms as f64 / 1000.0,
            style(summary.found).green().bold()
        ));
    }
}

impl Renderer for PlainRenderer {
    fn render(&mut self, event: &ScanEvent) -> CliResult<()> {
        match event {
            ScanEvent::Progress { snapshot, .. } => self.progress(snapshot),
            ScanEvent::PortFound(result) => self.line(port_line(result)),
            ScanEvent::PathFound(result) => self.line(path_line(result)),
            ScanEvent::Error { message, .. } => print_error(message),
            ScanEvent::Complete { summary, .. } => self.summary(summary),
            ScanEvent::Status { status, .. } => match status {
                ScanStatus::Stopping if !self.quiet => {
                    self.line(format!("{} stopping, waiting for in-flight probes", style("ℹ").blue().bold()))
                }
                ScanStatus::Cancelled => print_warning(&format!("{} cancelled", self.kind)),
                _ => {}
            },
        }
        Ok(())
    }

    fn finish(&mut self) -> CliResult<()> {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        Ok(())
    }
}

fn port_line(result: &PortResult) -> String {
    let mut detail = Vec::new();
    if let Some(product) = &result.product {
        detail.push(match &result.version {
            Some(version) => format!("{} {}", product, version),
            None => product.clone(),
        });
    }
    if let Some(os) = &result.os {
        detail.push(format!("({})", os));
    }
    if result.tls == Some(true) {
        detail.push("[tls]".to_string());
    }
    let banner = result
        .banner
        .as_deref()
        .filter(|_| detail.is_empty())
        .map(|b| truncate_string(b, 35))
        .unwrap_or_default();

    let service = if result.service == UNKNOWN {
        style(result.service.clone()).dim()
    } else {
        style(result.service.clone()).white()
    };

    format!(
        "  {:>6}  {}  {:<12}  {} {}",
        result.port,
        style("open").green().bold(),
        service,
        detail.join(" "),
        style(banner).dim()
    )
}

fn path_line(result: &PathResult) -> String {
    let status_style = match result.status_code {
        200..=299 => Style::new().green().bold(),
        300..=399 => Style::new().cyan(),
        401 | 403 => Style::new().yellow(),
        _ => Style::new().dim(),
    };

    format!(
        "  {}  {:>9}  {}",
        status_style.apply_to(result.status_code),
        format_size(result.content_length),
        result.full_url
    )
}

/// Print a header before scanning begins.
pub fn print_scan_header(kind: JobKind, target: &str, total: u64) {
    println!();
    println!(
        "{} {} v{}",
        style("Starting").cyan(),
        style("Glideway").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{} Job: {}", style("•").dim(), style(kind).yellow());
    println!("{} Target: {}", style("•").dim(), style(target).white().bold());
    println!(
        "{} Scanning {} items...",
        style("•").dim(),
        style(total).white().bold()
    );
    println!();
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", style("Error:").red().bold(), msg);
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}

fn format_size(bytes: u64) -> String {
    match bytes {
        0..=1023 => format!("{}B", bytes),
        1024..=1_048_575 => format!("{:.1}KB", bytes as f64 / 1024.0),
        _ => format!("{:.1}MB", bytes as f64 / 1_048_576.0),
    }
}

/// Truncate a string to a maximum length, adding ellipsis if truncated.
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
