//! Events pushed from running jobs to the host.
//!
//! Every event has a wire name (see [`JobKind`] for the per-kind names) and
//! a JSON payload. Sinks receive events from several tasks at once and must
//! not block.

use crate::job::{JobKind, ScanStatus};
use crate::progress::ProgressSnapshot;
use crate::scanner::{PathResult, PortResult};
use crate::types::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Summary attached to a completion event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub job_id: JobId,
    pub target: String,
    pub total: u64,
    pub scanned: u64,
    pub found: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// A named event with a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Status { kind: JobKind, status: ScanStatus },
    Progress { kind: JobKind, snapshot: ProgressSnapshot },
    PortFound(PortResult),
    PathFound(PathResult),
    Error { kind: JobKind, message: String },
    Complete { kind: JobKind, summary: ScanSummary },
}

impl ScanEvent {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::PortFound(_) => JobKind::PortScan,
            Self::PathFound(_) => JobKind::PathScan,
            Self::Status { kind, .. }
            | Self::Progress { kind, .. }
            | Self::Error { kind, .. }
            | Self::Complete { kind, .. } => *kind,
        }
    }

    /// Wire name, e.g. `scan-progress` or `path-found`.
    pub fn name(&self) -> &'static str {
        let kind = self.kind();
        match self {
            Self::Status { .. } => kind.status_event(),
            Self::Progress { .. } => kind.progress_event(),
            Self::PortFound(_) | Self::PathFound(_) => kind.found_event(),
            Self::Error { .. } => kind.error_event(),
            Self::Complete { .. } => kind.complete_event(),
        }
    }

    /// JSON payload. Status and error events carry a bare string.
    pub fn payload(&self) -> Value {
        let value = match self {
            Self::Status { status, .. } => serde_json::to_value(status),
            Self::Progress { snapshot, .. } => serde_json::to_value(snapshot),
            Self::PortFound(result) => serde_json::to_value(result),
            Self::PathFound(result) => serde_json::to_value(result),
            Self::Error { message, .. } => Ok(Value::String(message.clone())),
            Self::Complete { summary, .. } => serde_json::to_value(summary),
        };
        value.unwrap_or_else(|e| {
            tracing::warn!(event = self.name(), error = %e, "failed to serialize event payload");
            Value::Null
        })
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::PortFound(_) | Self::PathFound(_))
    }

    /// Whether this is the final `idle` status of a job.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Status { status: ScanStatus::Idle, .. })
    }
}

/// Receiver of job events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

impl<F> EventSink for F
where
    F: Fn(ScanEvent) + Send + Sync,
{
    fn emit(&self, event: ScanEvent) {
        self(event)
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ScanEvent) {}
}

/// Sink forwarding events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ScanEvent) {
        // The receiver going away just means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressStatus;
    use crate::types::Port;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_event_names() {
        let status = ScanEvent::Status {
            kind: JobKind::PortScan,
            status: ScanStatus::Running,
        };
        assert_eq!(status.name(), "scan-status");

        let progress = ScanEvent::Progress {
            kind: JobKind::PathScan,
            snapshot: ProgressSnapshot::idle(),
        };
        assert_eq!(progress.name(), "dirsearch-progress");

        let found = ScanEvent::PortFound(PortResult::open(Port::new(22).unwrap()));
        assert_eq!(found.name(), "port-found");
        assert!(found.is_found());

        let error = ScanEvent::Error {
            kind: JobKind::PathScan,
            message: "boom".into(),
        };
        assert_eq!(error.name(), "dirsearch-error");
    }

    #[test]
    fn test_payload_shapes() {
        let status = ScanEvent::Status {
            kind: JobKind::PathScan,
            status: ScanStatus::Stopping,
        };
        assert_eq!(status.payload(), Value::String("stopping".into()));

        let progress = ScanEvent::Progress {
            kind: JobKind::PortScan,
            snapshot: ProgressSnapshot {
                scanned: 3,
                total: 9,
                speed: 0.0,
                status: ProgressStatus::Scanning,
            },
        };
        let payload = progress.payload();
        assert_eq!(payload["scanned"], 3);
        assert_eq!(payload["status"], "scanning");

        let found = ScanEvent::PathFound(PathResult {
            path: "admin".into(),
            full_url: "http://h/admin".into(),
            status_code: 403,
            content_type: String::new(),
            content_length: 0,
        });
        assert_eq!(found.payload()["fullURL"], "http://h/admin");
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let sink = move |_event: ScanEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        sink.emit(ScanEvent::Status {
            kind: JobKind::PortScan,
            status: ScanStatus::Idle,
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_sink_survives_dropped_receiver() {
        let (sink, mut rx) = ChannelSink::channel();
        let event = ScanEvent::Status {
            kind: JobKind::PortScan,
            status: ScanStatus::Idle,
        };
        sink.emit(event.clone());
        assert_eq!(rx.recv().await, Some(event.clone()));

        drop(rx);
        sink.emit(event);
    }
}
