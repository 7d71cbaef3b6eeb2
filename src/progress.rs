//! Progress tracking and reporting.
//!
//! Workers bump [`JobCounters`] on dispatch; a [`ProgressReporter`] samples
//! them on a fixed tick and forwards a [`ProgressSnapshot`] to the sink
//! whenever the scanned count moved since the last emission.

use crate::events::EventSink;
use crate::job::ActiveJob;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Status carried by a progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Idle,
    Scanning,
    Stopping,
    Cancelled,
    Completed,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Error)
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Stopping => "stopping",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A point-in-time view of a job's progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub scanned: u64,
    pub total: u64,
    /// Items per second.
    pub speed: f64,
    pub status: ProgressStatus,
}

impl ProgressSnapshot {
    pub fn idle() -> Self {
        Self {
            scanned: 0,
            total: 0,
            speed: 0.0,
            status: ProgressStatus::Idle,
        }
    }

}

/// Shared scanned/total/found counters of one job.
#[derive(Debug, Default)]
pub struct JobCounters {
    scanned: AtomicU64,
    total: AtomicU64,
    found: AtomicU64,
}

impl JobCounters {
    pub fn new(total: u64) -> Self {
        let counters = Self::default();
        counters.set_total(total);
        counters
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Count one item as scanned. Called when the item is dispatched.
    pub fn record_dispatch(&self) -> u64 {
        self.scanned.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_found(&self) -> u64 {
        self.found.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Scanned count, clamped to `[0, total]`.
    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::SeqCst).min(self.total())
    }

    pub fn found(&self) -> u64 {
        self.found.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, speed: f64, status: ProgressStatus) -> ProgressSnapshot {
        ProgressSnapshot {
            scanned: self.scanned(),
            total: self.total(),
            speed,
            status,
        }
    }
}

/// Instantaneous speed as Δscanned / Δt between samples.
#[derive(Debug)]
pub struct SpeedMeter {
    last_scanned: u64,
    last_at: Instant,
}

impl SpeedMeter {
    pub fn new(scanned: u64, at: Instant) -> Self {
        Self {
            last_scanned: scanned,
            last_at: at,
        }
    }

    pub fn sample(&mut self, scanned: u64, at: Instant) -> f64 {
        let elapsed = at.saturating_duration_since(self.last_at).as_secs_f64();
        let delta = scanned.saturating_sub(self.last_scanned);
        self.last_scanned = scanned;
        self.last_at = at;
        if elapsed > 0.0 {
            delta as f64 / elapsed
        } else {
            0.0
        }
    }
}

/// Average rate over a whole run.
pub fn average_speed(scanned: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        scanned as f64 / secs
    } else {
        0.0
    }
}

/// Background task emitting progress snapshots while a job scans.
pub struct ProgressReporter {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl ProgressReporter {
    /// Start sampling the job's counters every `interval`.
    ///
    /// The reporter ends when `stop` is cancelled or [`finish`](Self::finish)
    /// is called; the terminal snapshot is left to the caller. Once the job
    /// is stopping no further scanning snapshot is emitted.
    pub fn spawn(job: Arc<ActiveJob>, interval: Duration, sink: Arc<dyn EventSink>, stop: CancellationToken) -> Self {
        let task_stop = stop.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            let mut meter = SpeedMeter::new(0, Instant::now());
            let mut last_reported = 0;

            loop {
                tokio::select! {
                    _ = task_stop.cancelled() => break,
                    at = ticker.tick() => {
                        let scanned = job.counters().scanned();
                        if scanned == last_reported {
                            continue;
                        }
                        let speed = meter.sample(scanned, at);
                        last_reported = scanned;
                        if !job.report_progress(sink.as_ref(), speed) {
                            break;
                        }
                    }
                }
            }
        });

        Self { stop, task }
    }

    /// Stop sampling and wait for the task to exit.
    pub async fn finish(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "progress reporter ended abnormally");
        }
    }
}
