//! Job lifecycle.
//!
//! A [`JobSlot`] holds at most one active job of its kind. The runner drives
//! a worker pool for that job, forwards results as events and emits exactly
//! one terminal outcome before releasing the slot.

use crate::error::{ServiceError, ServiceResult};
use crate::events::{EventSink, ScanEvent, ScanSummary};
use crate::progress::{average_speed, JobCounters, ProgressReporter, ProgressSnapshot, ProgressStatus};
use crate::scanner::{PoolSummary, Probe, Shutdown, WorkerPool};
use crate::types::JobId;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The two kinds of job the service runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    PortScan,
    PathScan,
}

impl JobKind {
    pub fn status_event(self) -> &'static str {
        match self {
            Self::PortScan => "scan-status",
            Self::PathScan => "dirsearch-status",
        }
    }

    pub fn progress_event(self) -> &'static str {
        match self {
            Self::PortScan => "scan-progress",
            Self::PathScan => "dirsearch-progress",
        }
    }

    pub fn found_event(self) -> &'static str {
        match self {
            Self::PortScan => "port-found",
            Self::PathScan => "path-found",
        }
    }

    pub fn error_event(self) -> &'static str {
        match self {
            Self::PortScan => "scan-error",
            Self::PathScan => "dirsearch-error",
        }
    }

    pub fn complete_event(self) -> &'static str {
        match self {
            Self::PortScan => "scan-complete",
            Self::PathScan => "dirsearch-complete",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortScan => f.write_str("port scan"),
            Self::PathScan => f.write_str("path scan"),
        }
    }
}

/// Whether a job of some kind is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running => f.write_str("running"),
        }
    }
}

/// Payload of a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Idle,
    Running,
    Stopping,
    Cancelled,
    Completed,
    Error,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Ending {
    Completed(PoolSummary),
    Cancelled,
    Failed(String),
}

/// State of the one running job of a slot.
#[derive(Debug)]
pub struct ActiveJob {
    id: JobId,
    kind: JobKind,
    target: String,
    shutdown: Arc<Shutdown>,
    counters: Arc<JobCounters>,
    started: Instant,
    started_at: DateTime<Utc>,
    // Serializes event emission against stop so nothing found is
    // forwarded after the stopping event.
    emit_lock: Mutex<()>,
    finished: AtomicBool,
}

impl ActiveJob {
    fn new(kind: JobKind, target: String, total: u64) -> Self {
        Self {
            id: JobId::new(),
            kind,
            target,
            shutdown: Arc::new(Shutdown::new()),
            counters: Arc::new(JobCounters::new(total)),
            started: Instant::now(),
            started_at: Utc::now(),
            emit_lock: Mutex::new(()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn counters(&self) -> &Arc<JobCounters> {
        &self.counters
    }

    pub fn shutdown(&self) -> &Arc<Shutdown> {
        &self.shutdown
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_closed()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Current progress with the average rate since start.
    pub fn progress(&self) -> ProgressSnapshot {
        let status = if self.is_stopping() {
            ProgressStatus::Stopping
        } else {
            ProgressStatus::Scanning
        };
        let speed = average_speed(self.counters.scanned(), self.elapsed());
        self.counters.snapshot(speed, status)
    }

    fn lock_emit(&self) -> MutexGuard<'_, ()> {
        self.emit_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request cancellation. Emits the stopping events on the first call only.
    pub fn request_stop(&self, sink: &dyn EventSink) {
        let _emit = self.lock_emit();
        if self.is_finished() || !self.shutdown.close() {
            return;
        }

        info!(job_id = %self.id.short(), kind = %self.kind, "stop requested");
        sink.emit(ScanEvent::Status {
            kind: self.kind,
            status: ScanStatus::Stopping,
        });
        sink.emit(ScanEvent::Progress {
            kind: self.kind,
            snapshot: self.counters.snapshot(0.0, ProgressStatus::Stopping),
        });
    }

    /// Emit a scanning snapshot unless the job is stopping or finished.
    pub fn report_progress(&self, sink: &dyn EventSink, speed: f64) -> bool {
        let _emit = self.lock_emit();
        if self.is_stopping() || self.is_finished() {
            return false;
        }
        sink.emit(ScanEvent::Progress {
            kind: self.kind,
            snapshot: self.counters.snapshot(speed, ProgressStatus::Scanning),
        });
        true
    }

    /// Forward a found result unless the job is stopping.
    pub fn forward_found(&self, sink: &dyn EventSink, event: ScanEvent) -> bool {
        let _emit = self.lock_emit();
        if self.is_stopping() || self.is_finished() {
            debug!(job_id = %self.id.short(), event = event.name(), "dropping result after stop");
            return false;
        }
        self.counters.record_found();
        sink.emit(event);
        true
    }

    /// Emit the terminal events. Only the first call has an effect.
    pub fn finish(&self, sink: &dyn EventSink, ending: Ending) -> bool {
        let _emit = self.lock_emit();
        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }

        let kind = self.kind;
        let elapsed = self.elapsed();
        match ending {
            Ending::Completed(pool) => {
                let scanned = self.counters.scanned();
                info!(
                    job_id = %self.id.short(),
                    %kind,
                    scanned,
                    found = self.counters.found(),
                    failed = pool.failed,
                    skipped = pool.skipped,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "job completed"
                );
                sink.emit(ScanEvent::Progress {
                    kind,
                    snapshot: self
                        .counters
                        .snapshot(average_speed(scanned, elapsed), ProgressStatus::Completed),
                });
                sink.emit(ScanEvent::Complete {
                    kind,
                    summary: self.summary(elapsed),
                });
                sink.emit(ScanEvent::Status {
                    kind,
                    status: ScanStatus::Completed,
                });
            }
            Ending::Cancelled => {
                info!(job_id = %self.id.short(), %kind, scanned = self.counters.scanned(), "job cancelled");
                sink.emit(ScanEvent::Progress {
                    kind,
                    snapshot: self.counters.snapshot(0.0, ProgressStatus::Cancelled),
                });
                sink.emit(ScanEvent::Status {
                    kind,
                    status: ScanStatus::Cancelled,
                });
            }
            Ending::Failed(message) => {
                warn!(job_id = %self.id.short(), %kind, %message, "job failed");
                sink.emit(ScanEvent::Error { kind, message });
                sink.emit(ScanEvent::Progress {
                    kind,
                    snapshot: self.counters.snapshot(0.0, ProgressStatus::Error),
                });
                sink.emit(ScanEvent::Status {
                    kind,
                    status: ScanStatus::Error,
                });
            }
        }
        true
    }

    fn summary(&self, elapsed: Duration) -> ScanSummary {
        ScanSummary {
            job_id: self.id,
            target: self.target.clone(),
            total: self.counters.total(),
            scanned: self.counters.scanned(),
            found: self.counters.found(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Holder of the single active job of one kind.
#[derive(Debug)]
pub struct JobSlot {
    kind: JobKind,
    current: Mutex<Option<Arc<ActiveJob>>>,
    state: watch::Sender<JobState>,
}

impl JobSlot {
    pub fn new(kind: JobKind) -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        Self {
            kind,
            current: Mutex::new(None),
            state,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<ActiveJob>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active(&self) -> Option<Arc<ActiveJob>> {
        self.lock().clone()
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Fail fast when a job is already active.
    pub fn ensure_idle(&self) -> ServiceResult<()> {
        if self.lock().is_some() {
            return Err(ServiceError::AlreadyRunning(self.kind));
        }
        Ok(())
    }

    /// Claim the slot for a new job and announce it.
    pub fn begin(&self, target: String, total: u64, sink: &dyn EventSink) -> ServiceResult<Arc<ActiveJob>> {
        let mut current = self.lock();
        if current.is_some() {
            return Err(ServiceError::AlreadyRunning(self.kind));
        }

        let job = Arc::new(ActiveJob::new(self.kind, target, total));
        info!(job_id = %job.id.short(), kind = %self.kind, target = %job.target, total, "job started");
        sink.emit(ScanEvent::Status {
            kind: self.kind,
            status: ScanStatus::Running,
        });
        sink.emit(ScanEvent::Progress {
            kind: self.kind,
            snapshot: job.counters.snapshot(0.0, ProgressStatus::Scanning),
        });

        *current = Some(Arc::clone(&job));
        self.state.send_replace(JobState::Running);
        Ok(job)
    }

    /// Stop the active job. Repeated calls while it drains are no-ops.
    pub fn stop(&self, sink: &dyn EventSink) -> ServiceResult<()> {
        let job = self.active().ok_or(ServiceError::NotRunning(self.kind))?;
        job.request_stop(sink);
        Ok(())
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.active()
            .map(|job| job.progress())
            .unwrap_or_else(ProgressSnapshot::idle)
    }

    /// Clear the slot if it still holds job `id`, then announce idle.
    pub fn release(&self, id: JobId, sink: &dyn EventSink) {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|job| job.id == id) {
            *current = None;
            self.state.send_replace(JobState::Idle);
            sink.emit(ScanEvent::Status {
                kind: self.kind,
                status: ScanStatus::Idle,
            });
        }
    }

    /// Resolve once no job of this kind is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.state.subscribe();
        // Only fails if the sender is gone, and `self` owns it
        let _ = rx.wait_for(|state| *state == JobState::Idle).await;
    }
}

/// One job's pool run, from first dispatch to release.
pub struct JobRun<P: Probe> {
    pub job: Arc<ActiveJob>,
    pub slot: Arc<JobSlot>,
    pub sink: Arc<dyn EventSink>,
    pub pool: WorkerPool<P>,
    pub items: Vec<P::Item>,
    pub progress_interval: Duration,
    pub found_event: fn(P::Output) -> ScanEvent,
}

impl<P: Probe> JobRun<P> {
    /// Run the job in the background.
    pub fn launch(self) -> JobId {
        let id = self.job.id;
        tokio::spawn(self.execute());
        id
    }

    async fn execute(self) {
        let Self {
            job,
            slot,
            sink,
            pool,
            items,
            progress_interval,
            found_event,
        } = self;
        let _release = ReleaseGuard {
            job: Arc::clone(&job),
            slot,
            sink: Arc::clone(&sink),
        };

        let reporter = ProgressReporter::spawn(
            Arc::clone(&job),
            progress_interval,
            Arc::clone(&sink),
            job.shutdown.token().child_token(),
        );

        let mut handle = pool.with_counters(Arc::clone(&job.counters)).spawn(items, Arc::clone(&job.shutdown));
        {
            let mut results = handle.results();
            while let Some(output) = results.next().await {
                job.forward_found(sink.as_ref(), found_event(output));
            }
        }

        reporter.finish().await;
        let ending = match handle.join().await {
            Ok(_) if job.is_stopping() => Ending::Cancelled,
            Ok(summary) => Ending::Completed(summary),
            Err(e) => Ending::Failed(format!("worker pool failed: {}", e)),
        };
        job.finish(sink.as_ref(), ending);
    }
}

/// Finishes and releases the job however the runner exits.
struct ReleaseGuard {
    job: Arc<ActiveJob>,
    slot: Arc<JobSlot>,
    sink: Arc<dyn EventSink>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.job.is_finished() {
            self.job
                .finish(self.sink.as_ref(), Ending::Failed("job aborted unexpectedly".to_string()));
        }
        self.slot.release(self.job.id, self.sink.as_ref());
    }
}
