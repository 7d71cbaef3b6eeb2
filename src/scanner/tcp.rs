//! TCP connect probe.
//!
//! Performs standard TCP connect scans using the operating system's
//! socket API, optionally followed by a fingerprinting step on open ports.
//! Does not require elevated privileges.

use crate::error::ProbeError;
use crate::fingerprint::Fingerprinter;
use crate::scanner::traits::{PortResult, Probe, ProbeOutcome};
use crate::types::Port;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// TCP connect probe.
///
/// A successful handshake means the port is open. Refused, unreachable and
/// timed-out connects are all a miss; only unexpected socket errors are
/// reported as transport failures.
pub struct TcpConnectProbe {
    target: IpAddr,
    timeout: Duration,
    fingerprinter: Option<Arc<dyn Fingerprinter>>,
}

impl TcpConnectProbe {
    /// Create a new TCP connect probe.
    ///
    /// # Arguments
    /// * `target` - Target IP address to scan
    /// * `timeout` - Connection timeout per port
    pub fn new(target: IpAddr, timeout: Duration) -> Self {
        Self {
            target,
            timeout,
            fingerprinter: None,
        }
    }

    /// Fingerprint open ports with the given implementation.
    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = Some(fingerprinter);
        self
    }

    /// Attempt to connect to the target address.
    async fn attempt_connect(&self, addr: SocketAddr) -> Result<Option<TcpStream>, ProbeError> {
        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(Some(stream)),
            Ok(Err(e)) => match e.kind() {
                ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::TimedOut => Ok(None),
                _ if e.to_string().to_lowercase().contains("unreachable") => Ok(None),
                _ => Err(ProbeError::Transport(e.to_string())),
            },
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl Probe for TcpConnectProbe {
    type Item = Port;
    type Output = PortResult;

    async fn probe(&self, port: Port, cancel: &CancellationToken) -> ProbeOutcome<PortResult> {
        if cancel.is_cancelled() {
            return ProbeOutcome::Failed(ProbeError::Cancelled);
        }

        let addr = SocketAddr::new(self.target, port.as_u16());
        let start = Instant::now();

        let stream = match self.attempt_connect(addr).await {
            Ok(Some(stream)) => stream,
            Ok(None) => return ProbeOutcome::Miss,
            Err(e) => return ProbeOutcome::Failed(e),
        };
        let response_time = start.elapsed().as_millis() as u64;

        let mut result = PortResult::open(port).with_response_time(response_time);
        if let Some(fingerprinter) = &self.fingerprinter {
            let found = fingerprinter.identify(stream, port).await;
            result.service = found.service;
            result.protocol = found.protocol;
            result.product = found.product;
            result.version = found.version;
            result.banner = found.banner;
            result.tls = found.tls;
            result.device_type = found.device_type;
            result.os = found.os;
        }

        tracing::debug!(target_ip = %self.target, %port, service = %result.service, "open port");
        ProbeOutcome::Found(result)
    }
}
