//! # Glideway - concurrent reconnaissance engine
//!
//! Glideway runs two kinds of background jobs against a single target:
//!
//! - **Port scans**: TCP connect probes over a port range, with optional
//!   service fingerprinting of open ports
//! - **Path scans**: HTTP requests for every entry of a wordlist, reporting
//!   paths whose status code is in the accepted set
//!
//! At most one job of each kind runs per [`ScanService`]. Jobs report
//! through an [`EventSink`]: status transitions, throttled progress, one
//! event per found item and a summary on completion.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use glideway::{EngineSettings, ScanService};
//! use glideway::events::ChannelSink;
//! use glideway::service::PortScanParams;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (sink, mut events) = ChannelSink::channel();
//!     let service = ScanService::new(EngineSettings::default(), Arc::new(sink));
//!
//!     service
//!         .start_port_scan(PortScanParams::new("127.0.0.1", 1, 1024, 200))
//!         .await
//!         .unwrap();
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{} {}", event.name(), event.payload());
//!         if event.is_idle() {
//!             break;
//!         }
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`service`] - Start/stop/status/progress surface and command dispatch
//! - [`job`] - Job slot lifecycle and the background runner
//! - [`scanner`] - Probes and the bounded worker pool
//! - [`fingerprint`] - Banner grabbing and service identification
//! - [`enumerate`] - Port range and wordlist work items
//! - [`progress`] - Counters, speed and the progress reporter
//! - [`events`] - Event types and sinks
//! - [`config`] - Engine settings
//! - [`output`] - Plain, JSON and CSV renderers
//! - [`error`] - Error types

pub mod cli;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod job;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod service;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::EngineSettings;
pub use error::{CliError, ConfigError, ProbeError, ResourceError, ServiceError};
pub use events::{EventSink, ScanEvent};
pub use job::{JobKind, JobState};
pub use progress::ProgressSnapshot;
pub use service::{Command, Reply, ScanService};
