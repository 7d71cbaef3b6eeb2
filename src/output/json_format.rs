//! JSON lines output.

use super::Renderer;
use crate::error::CliResult;
use crate::events::ScanEvent;
use serde_json::{json, Value};
use std::io::{self, Write};

/// `{"event": <name>, "payload": <payload>}`
pub fn envelope(event: &ScanEvent) -> Value {
    json!({
        "event": event.name(),
        "payload": event.payload(),
    })
}

/// Writes one envelope per event.
pub struct JsonRenderer<W: Write + Send> {
    out: W,
}

impl JsonRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Renderer for JsonRenderer<W> {
    fn render(&mut self, event: &ScanEvent) -> CliResult<()> {
        serde_json::to_writer(&mut self.out, &envelope(event))?;
        writeln!(self.out)?;
        Ok(())
    }

    fn finish(&mut self) -> CliResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobKind, ScanStatus};

    #[test]
    fn test_one_line_per_event() {
        let mut renderer = JsonRenderer::new(Vec::new());
        renderer
            .render(&ScanEvent::Status {
                kind: JobKind::PathScan,
                status: ScanStatus::Running,
            })
            .unwrap();
        renderer
            .render(&ScanEvent::Error {
                kind: JobKind::PathScan,
                message: "boom".into(),
            })
            .unwrap();

        let text = String::from_utf8(renderer.into_inner()).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], json!({"event": "dirsearch-status", "payload": "running"}));
        assert_eq!(lines[1]["event"], "dirsearch-error");
    }
}
