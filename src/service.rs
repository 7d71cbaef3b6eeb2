//! The scan service: the function surface a host binds to.
//!
//! A [`ScanService`] owns one [`JobSlot`] per job kind, so independent
//! instances never share state. Start operations validate and enumerate
//! synchronously, then hand the job to a background runner and return.

use crate::config::EngineSettings;
use crate::enumerate;
use crate::error::{ConfigError, ConfigResult, ServiceResult};
use crate::events::{EventSink, ScanEvent};
use crate::fingerprint::{BannerFingerprinter, Fingerprinter};
use crate::job::{JobKind, JobRun, JobSlot, JobState};
use crate::progress::ProgressSnapshot;
use crate::scanner::http::build_client;
use crate::scanner::{AcceptedStatusSet, HttpPathProbe, RateLimiter, TcpConnectProbe, WorkerPool};
use crate::types::{BaseUrl, HostTarget, JobId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Parameters of a port scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortScanParams {
    pub target: String,
    pub start_port: u32,
    pub end_port: u32,
    pub max_concurrency: i64,
    /// Overrides the `fingerprint` setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<bool>,
    /// Overrides the `rate_limit` setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

impl PortScanParams {
    pub fn new(target: impl Into<String>, start_port: u32, end_port: u32, max_concurrency: i64) -> Self {
        Self {
            target: target.into(),
            start_port,
            end_port,
            max_concurrency,
            fingerprint: None,
            rate_limit: None,
        }
    }
}

/// Parameters of a path scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathScanParams {
    pub target: String,
    pub wordlist_path: PathBuf,
    pub max_concurrency: i64,
    /// Overrides the `accepted_status` setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_status: Option<AcceptedStatusSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

impl PathScanParams {
    pub fn new(target: impl Into<String>, wordlist_path: impl Into<PathBuf>, max_concurrency: i64) -> Self {
        Self {
            target: target.into(),
            wordlist_path: wordlist_path.into(),
            max_concurrency,
            accepted_status: None,
            rate_limit: None,
        }
    }
}

fn positive_concurrency(requested: i64) -> ConfigResult<usize> {
    usize::try_from(requested)
        .ok()
        .filter(|n| *n > 0)
        .ok_or(ConfigError::NonPositiveConcurrency)
}

/// Start/stop/status/progress capability set of one job kind.
#[async_trait]
pub trait JobControl: Send + Sync {
    type Params: Send + 'static;

    fn slot(&self) -> &JobSlot;

    fn sink(&self) -> &dyn EventSink;

    /// Validate, enumerate and launch a job. Returns once it is running.
    async fn start(&self, params: Self::Params) -> ServiceResult<JobId>;

    fn stop(&self) -> ServiceResult<()> {
        self.slot().stop(self.sink())
    }

    fn status(&self) -> JobState {
        self.slot().state()
    }

    fn progress(&self) -> ProgressSnapshot {
        self.slot().progress()
    }

    async fn wait_idle(&self) {
        self.slot().wait_idle().await
    }
}

/// Port scan controller.
pub struct PortScanner {
    slot: Arc<JobSlot>,
    sink: Arc<dyn EventSink>,
    settings: Arc<EngineSettings>,
    fingerprinter: Arc<dyn Fingerprinter>,
}

#[async_trait]
impl JobControl for PortScanner {
    type Params = PortScanParams;

    fn slot(&self) -> &JobSlot {
        &self.slot
    }

    fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    async fn start(&self, params: PortScanParams) -> ServiceResult<JobId> {
        self.slot.ensure_idle()?;
        let concurrency = positive_concurrency(params.max_concurrency)?;
        let ports = enumerate::port_items(params.start_port, params.end_port)?;
        let host = HostTarget::resolve(&params.target).await?;

        let mut probe = TcpConnectProbe::new(host.ip, self.settings.connect_timeout());
        if params.fingerprint.unwrap_or(self.settings.fingerprint) {
            probe = probe.with_fingerprinter(Arc::clone(&self.fingerprinter));
        }
        let limiter = RateLimiter::per_second(params.rate_limit.unwrap_or(self.settings.rate_limit));
        let pool = WorkerPool::new(Arc::new(probe), concurrency)?.with_rate_limiter(limiter);

        let job = self.slot.begin(host.to_string(), ports.len() as u64, self.sink.as_ref())?;
        let run = JobRun {
            job,
            slot: Arc::clone(&self.slot),
            sink: Arc::clone(&self.sink),
            pool,
            items: ports,
            progress_interval: self.settings.progress_interval(),
            found_event: ScanEvent::PortFound,
        };
        Ok(run.launch())
    }
}

/// Path scan controller.
pub struct PathScanner {
    slot: Arc<JobSlot>,
    sink: Arc<dyn EventSink>,
    settings: Arc<EngineSettings>,
}

#[async_trait]
impl JobControl for PathScanner {
    type Params = PathScanParams;

    fn slot(&self) -> &JobSlot {
        &self.slot
    }

    fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    async fn start(&self, params: PathScanParams) -> ServiceResult<JobId> {
        self.slot.ensure_idle()?;
        let concurrency = positive_concurrency(params.max_concurrency)?;
        let base = BaseUrl::parse(&params.target)?;
        let entries = enumerate::wordlist_items(&params.wordlist_path).await?;

        let accepted = params
            .accepted_status
            .unwrap_or_else(|| self.settings.accepted_status.clone());
        if accepted.is_empty() {
            return Err(ConfigError::InvalidSetting("accepted status set is empty".into()).into());
        }

        let client = build_client(&self.settings.user_agent, self.settings.http_timeout())?;
        let probe = HttpPathProbe::new(client, base.clone(), accepted).with_retry(self.settings.retry_policy());
        let limiter = RateLimiter::per_second(params.rate_limit.unwrap_or(self.settings.rate_limit));
        let pool = WorkerPool::new(Arc::new(probe), concurrency)?.with_rate_limiter(limiter);

        let job = self.slot.begin(base.to_string(), entries.len() as u64, self.sink.as_ref())?;
        let run = JobRun {
            job,
            slot: Arc::clone(&self.slot),
            sink: Arc::clone(&self.sink),
            pool,
            items: entries,
            progress_interval: self.settings.progress_interval(),
            found_event: ScanEvent::PathFound,
        };
        Ok(run.launch())
    }
}

/// A typed request to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    StartPortScan(PortScanParams),
    StopPortScan,
    GetPortScanStatus,
    GetPortScanProgress,
    StartPathScan(PathScanParams),
    StopPathScan,
    GetPathScanStatus,
    GetPathScanProgress,
}

/// Answer to a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "value", rename_all = "lowercase")]
pub enum Reply {
    Started(JobId),
    Stopped,
    Status(JobState),
    Progress(ProgressSnapshot),
}

/// Scan engine with one port scan and one path scan slot.
pub struct ScanService {
    settings: Arc<EngineSettings>,
    ports: PortScanner,
    paths: PathScanner,
}

impl ScanService {
    pub fn new(settings: EngineSettings, sink: Arc<dyn EventSink>) -> Self {
        let settings = Arc::new(settings);
        let fingerprinter = Arc::new(BannerFingerprinter::new(settings.banner_timeout()));

        Self {
            ports: PortScanner {
                slot: Arc::new(JobSlot::new(JobKind::PortScan)),
                sink: Arc::clone(&sink),
                settings: Arc::clone(&settings),
                fingerprinter,
            },
            paths: PathScanner {
                slot: Arc::new(JobSlot::new(JobKind::PathScan)),
                sink,
                settings: Arc::clone(&settings),
            },
            settings,
        }
    }

    /// Replace the fingerprinter used on open ports.
    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.ports.fingerprinter = fingerprinter;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn ports(&self) -> &PortScanner {
        &self.ports
    }

    pub fn paths(&self) -> &PathScanner {
        &self.paths
    }

    pub async fn start_port_scan(&self, params: PortScanParams) -> ServiceResult<JobId> {
        self.ports.start(params).await
    }

    pub fn stop_port_scan(&self) -> ServiceResult<()> {
        self.ports.stop()
    }

    pub fn port_scan_status(&self) -> JobState {
        self.ports.status()
    }

    pub fn port_scan_progress(&self) -> ProgressSnapshot {
        self.ports.progress()
    }

    pub async fn start_path_scan(&self, params: PathScanParams) -> ServiceResult<JobId> {
        self.paths.start(params).await
    }

    pub fn stop_path_scan(&self) -> ServiceResult<()> {
        self.paths.stop()
    }

    pub fn path_scan_status(&self) -> JobState {
        self.paths.status()
    }

    pub fn path_scan_progress(&self) -> ProgressSnapshot {
        self.paths.progress()
    }

    pub fn stop(&self, kind: JobKind) -> ServiceResult<()> {
        match kind {
            JobKind::PortScan => self.ports.stop(),
            JobKind::PathScan => self.paths.stop(),
        }
    }

    pub async fn wait_idle(&self, kind: JobKind) {
        match kind {
            JobKind::PortScan => self.ports.wait_idle().await,
            JobKind::PathScan => self.paths.wait_idle().await,
        }
    }

    /// Stop whatever is running and wait for both slots to drain.
    pub async fn shutdown(&self) {
        for kind in [JobKind::PortScan, JobKind::PathScan] {
            // NotRunning is fine here
            let _ = self.stop(kind);
            self.wait_idle(kind).await;
        }
    }

    /// Execute one command.
    pub async fn dispatch(&self, command: Command) -> ServiceResult<Reply> {
        let reply = match command {
            Command::StartPortScan(params) => Reply::Started(self.start_port_scan(params).await?),
            Command::StopPortScan => {
                self.stop_port_scan()?;
                Reply::Stopped
            }
            Command::GetPortScanStatus => Reply::Status(self.port_scan_status()),
            Command::GetPortScanProgress => Reply::Progress(self.port_scan_progress()),
            Command::StartPathScan(params) => Reply::Started(self.start_path_scan(params).await?),
            Command::StopPathScan => {
                self.stop_path_scan()?;
                Reply::Stopped
            }
            Command::GetPathScanStatus => Reply::Status(self.path_scan_status()),
            Command::GetPathScanProgress => Reply::Progress(self.path_scan_progress()),
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ResourceError, ServiceError};
    use crate::job::ScanStatus;
    use crate::progress::ProgressStatus;
    use crate::testing::{spawn_http_server, spawn_slow_http_server, RecordingSink};
    use std::io::Write;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn test_settings() -> EngineSettings {
        EngineSettings {
            connect_timeout_ms: 500,
            http_timeout_ms: 2000,
            retry_backoff_ms: 10,
            progress_interval_ms: 10,
            fingerprint: false,
            ..EngineSettings::default()
        }
    }

    fn service() -> (ScanService, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (ScanService::new(test_settings(), sink.clone()), sink)
    }

    fn wordlist(lines: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", lines).unwrap();
        file
    }

    async fn settle(service: &ScanService, kind: JobKind) {
        timeout(Duration::from_secs(20), service.wait_idle(kind))
            .await
            .expect("job did not return to idle");
    }

    #[tokio::test]
    async fn test_port_scan_runs_to_completion() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let start = u32::from(open).saturating_sub(2).clamp(1, 65531);
        let end = start + 4;

        let (service, sink) = service();
        service
            .start_port_scan(PortScanParams::new("127.0.0.1", start, end, 8))
            .await
            .unwrap();
        settle(&service, JobKind::PortScan).await;

        assert!(sink.found_ports().contains(&open));

        let progress = sink.progress(JobKind::PortScan);
        assert_eq!(progress.first().map(|p| (p.scanned, p.status)), Some((0, ProgressStatus::Scanning)));
        let last = progress.last().unwrap();
        assert_eq!(last.status, ProgressStatus::Completed);
        assert_eq!(last.scanned, 5);
        assert_eq!(last.total, 5);

        let summary = sink.summary(JobKind::PortScan).unwrap();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.scanned, 5);
        assert_eq!(summary.found, sink.found_ports().len() as u64);

        let statuses = sink.statuses(JobKind::PortScan);
        assert_eq!(
            statuses,
            vec![ScanStatus::Running, ScanStatus::Completed, ScanStatus::Idle]
        );
        assert_eq!(service.port_scan_status(), JobState::Idle);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let (service, sink) = service();
        service
            .start_port_scan(PortScanParams::new("127.0.0.1", 1, 65535, 1))
            .await
            .unwrap();
        assert_eq!(service.port_scan_status(), JobState::Running);

        let err = service
            .start_port_scan(PortScanParams::new("127.0.0.1", 1, 10, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyRunning(JobKind::PortScan)));

        service.stop_port_scan().unwrap();
        settle(&service, JobKind::PortScan).await;
        assert_eq!(
            sink.statuses(JobKind::PortScan),
            vec![
                ScanStatus::Running,
                ScanStatus::Stopping,
                ScanStatus::Cancelled,
                ScanStatus::Idle
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_an_error() {
        let (service, sink) = service();
        tokio_test::assert_err!(service.stop_port_scan());
        tokio_test::assert_err!(service.stop_path_scan());
        assert_eq!(service.port_scan_status(), JobState::Idle);
        assert_eq!(service.path_scan_progress(), ProgressSnapshot::idle());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_parameters_rejected_synchronously() {
        let (service, sink) = service();

        let err = service
            .start_port_scan(PortScanParams::new("127.0.0.1", 1, 10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(ConfigError::NonPositiveConcurrency)));

        let err = service
            .start_port_scan(PortScanParams::new("127.0.0.1", 100, 10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(ConfigError::InvalidPortRange(_))));

        let err = service
            .start_port_scan(PortScanParams::new("", 1, 10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(ConfigError::InvalidTarget(_))));

        let list = wordlist("admin\n");
        let err = service
            .start_path_scan(PathScanParams::new("ftp://example.com", list.path(), 5))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(ConfigError::InvalidUrl { .. })));

        assert!(sink.events().is_empty());
        assert_eq!(service.port_scan_status(), JobState::Idle);
    }

    #[tokio::test]
    async fn test_empty_wordlist_creates_no_job() {
        let (service, sink) = service();
        let list = wordlist("# only comments\n\n   \n#another\n");

        let err = service
            .start_path_scan(PathScanParams::new("http://127.0.0.1:1", list.path(), 5))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Resource(ResourceError::EmptyWordlist { .. })));
        assert_eq!(service.path_scan_status(), JobState::Idle);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_path_scan_reports_accepted_paths() {
        let addr = spawn_http_server(&[("/admin", 200), ("/old", 301), ("/broken", 500)]).await;
        let list = wordlist("admin\n# comment\nmissing\nbroken\n/old\n");

        let (service, sink) = service();
        service
            .start_path_scan(PathScanParams::new(format!("127.0.0.1:{}", addr.port()), list.path(), 4))
            .await
            .unwrap();
        settle(&service, JobKind::PathScan).await;

        let mut found = sink.found_paths();
        found.sort();
        assert_eq!(found, vec!["admin".to_string(), "old".to_string()]);

        let summary = sink.summary(JobKind::PathScan).unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.scanned, 4);
        assert_eq!(summary.found, 2);
        assert_eq!(summary.target, format!("http://127.0.0.1:{}/", addr.port()));

        let names = sink.names();
        assert_eq!(
            &names[names.len() - 4..],
            &["dirsearch-progress", "dirsearch-complete", "dirsearch-status", "dirsearch-status"]
        );
    }

    #[tokio::test]
    async fn test_stop_cancels_path_scan_cleanly() {
        let addr = spawn_slow_http_server(Duration::from_millis(50)).await;
        let entries: Vec<String> = (0..400).map(|i| format!("entry{}", i)).collect();
        let list = wordlist(&entries.join("\n"));

        let (service, sink) = service();
        service
            .start_path_scan(PathScanParams::new(format!("http://{}", addr), list.path(), 2))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        service.stop_path_scan().unwrap();
        // A second stop while draining is accepted and changes nothing
        service.stop_path_scan().unwrap();
        settle(&service, JobKind::PathScan).await;

        let events = sink.events();
        let stopping_at = events
            .iter()
            .position(|e| matches!(e, ScanEvent::Status { status: ScanStatus::Stopping, .. }))
            .unwrap();
        assert!(events[..stopping_at].iter().any(ScanEvent::is_found));
        assert!(!events[stopping_at..].iter().any(ScanEvent::is_found));

        let cancelled: Vec<_> = sink
            .progress(JobKind::PathScan)
            .into_iter()
            .filter(|p| p.status == ProgressStatus::Cancelled)
            .collect();
        assert_eq!(cancelled.len(), 1);
        assert!(cancelled[0].scanned < cancelled[0].total);

        assert_eq!(
            sink.statuses(JobKind::PathScan),
            vec![
                ScanStatus::Running,
                ScanStatus::Stopping,
                ScanStatus::Cancelled,
                ScanStatus::Idle
            ]
        );
        assert!(sink.summary(JobKind::PathScan).is_none());

        // The slot is free again
        let again = wordlist("admin\n");
        service
            .start_path_scan(PathScanParams::new(format!("http://{}", addr), again.path(), 1))
            .await
            .unwrap();
        settle(&service, JobKind::PathScan).await;
    }

    #[tokio::test]
    async fn test_dispatch_typed_commands() {
        let (service, _sink) = service();

        let command: Command = serde_json::from_str(r#"{"command":"GetPortScanStatus"}"#).unwrap();
        let reply = service.dispatch(command).await.unwrap();
        assert_eq!(reply, Reply::Status(JobState::Idle));
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            serde_json::json!({"reply": "status", "value": "idle"})
        );

        let command: Command = serde_json::from_str(
            r#"{"command":"StartPathScan","target":"http://127.0.0.1:1","wordlistPath":"/nonexistent/words.txt","maxConcurrency":5}"#,
        )
        .unwrap();
        let err = service.dispatch(command).await.unwrap_err();
        assert!(matches!(err, ServiceError::Resource(ResourceError::Unreadable { .. })));

        let err = service.dispatch(Command::StopPathScan).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotRunning(JobKind::PathScan)));

        let reply = service.dispatch(Command::GetPathScanProgress).await.unwrap();
        assert_eq!(reply, Reply::Progress(ProgressSnapshot::idle()));
    }

    #[tokio::test]
    async fn test_instances_are_independent() {
        let (first, _) = service();
        let (second, _) = service();
        first
            .start_port_scan(PortScanParams::new("127.0.0.1", 1, 65535, 1))
            .await
            .unwrap();
        assert_eq!(second.port_scan_status(), JobState::Idle);

        first.shutdown().await;
        assert_eq!(first.port_scan_status(), JobState::Idle);
    }
}
