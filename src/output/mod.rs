//! Output formatting module.
//!
//! Renders job events as they arrive: plain text with a progress bar,
//! JSON lines, or CSV rows of found items.

mod csv_format;
mod json_format;
mod plain;

pub use csv_format::CsvRenderer;
pub use json_format::{envelope, JsonRenderer};
pub use plain::{print_error, print_warning, PlainRenderer};

use crate::cli::OutputFormat;
use crate::error::CliResult;
use crate::events::ScanEvent;
use crate::job::JobKind;

/// Consumer of a job's event stream.
pub trait Renderer: Send {
    fn render(&mut self, event: &ScanEvent) -> CliResult<()>;

    /// Flush anything buffered once the job is idle.
    fn finish(&mut self) -> CliResult<()> {
        Ok(())
    }
}

/// Build the renderer for `format`.
pub fn renderer(format: OutputFormat, kind: JobKind, target: &str, quiet: bool) -> Box<dyn Renderer> {
    match format {
        OutputFormat::Plain => Box::new(PlainRenderer::new(kind, target, quiet)),
        OutputFormat::Json => Box::new(JsonRenderer::stdout()),
        OutputFormat::Csv => Box::new(CsvRenderer::stdout()),
    }
}
