//! CSV output of found items.

use super::Renderer;
use crate::error::CliResult;
use crate::events::ScanEvent;
use crate::scanner::{PathResult, PortResult};
use std::io::{self, Write};

const PORT_HEADER: [&str; 9] = [
    "port",
    "protocol",
    "service",
    "product",
    "version",
    "os",
    "tls",
    "banner",
    "response_time_ms",
];

const PATH_HEADER: [&str; 5] = ["path", "full_url", "status_code", "content_type", "content_length"];

/// Writes a row per found item; other events are ignored.
pub struct CsvRenderer<W: Write + Send> {
    wtr: csv::Writer<W>,
    header_written: bool,
}

impl CsvRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> CsvRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            wtr: csv::Writer::from_writer(out),
            header_written: false,
        }
    }

    fn header(&mut self, header: &[&str]) -> CliResult<()> {
        if !self.header_written {
            self.wtr.write_record(header)?;
            self.header_written = true;
        }
        Ok(())
    }

    fn port_row(&mut self, result: &PortResult) -> CliResult<()> {
        self.header(&PORT_HEADER)?;
        let port = result.port.to_string();
        let tls = result.tls.map_or(String::new(), |t| t.to_string());
        let response_time = result.response_time_ms.map_or(String::new(), |t| t.to_string());
        self.wtr.write_record([
            port.as_str(),
            result.protocol.as_str(),
            result.service.as_str(),
            result.product.as_deref().unwrap_or(""),
            result.version.as_deref().unwrap_or(""),
            result.os.as_deref().unwrap_or(""),
            tls.as_str(),
            result.banner.as_deref().unwrap_or(""),
            response_time.as_str(),
        ])?;
        Ok(())
    }

    fn path_row(&mut self, result: &PathResult) -> CliResult<()> {
        self.header(&PATH_HEADER)?;
        let status = result.status_code.to_string();
        let length = result.content_length.to_string();
        self.wtr.write_record([
            result.path.as_str(),
            result.full_url.as_str(),
            status.as_str(),
            result.content_type.as_str(),
            length.as_str(),
        ])?;
        Ok(())
    }

    pub fn into_inner(self) -> CliResult<W> {
        self.wtr.into_inner().map_err(|e| e.into_error().into())
    }
}

impl<W: Write + Send> Renderer for CsvRenderer<W> {
    fn render(&mut self, event: &ScanEvent) -> CliResult<()> {
        match event {
            ScanEvent::PortFound(result) => self.port_row(result),
            ScanEvent::PathFound(result) => self.path_row(result),
            _ => Ok(()),
        }
    }

    fn finish(&mut self) -> CliResult<()> {
        self.wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobKind, ScanStatus};

    #[test]
    fn test_path_rows_with_single_header() {
        let mut renderer = CsvRenderer::new(Vec::new());
        for path in ["admin", "login"] {
            renderer
                .render(&ScanEvent::PathFound(PathResult {
                    path: path.to_string(),
                    full_url: format!("http://h/{}", path),
                    status_code: 200,
                    content_type: "text/html".into(),
                    content_length: 12,
                }))
                .unwrap();
        }
        renderer
            .render(&ScanEvent::Status {
                kind: JobKind::PathScan,
                status: ScanStatus::Completed,
            })
            .unwrap();
        renderer.finish().unwrap();

        let text = String::from_utf8(renderer.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "path,full_url,status_code,content_type,content_length\n\
             admin,http://h/admin,200,text/html,12\n\
             login,http://h/login,200,text/html,12\n"
        );
    }
}
