//! Probe trait abstraction.
//!
//! Defines the common shape of every unit of work: one probe against one
//! work item, returning an explicit outcome instead of panicking or erroring
//! out of the pool.

use crate::error::ProbeError;
use crate::types::Port;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Outcome of probing a single work item.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome<T> {
    /// The item is interesting and produced a result.
    Found(T),
    /// The item was probed and is not interesting (closed port, unaccepted status).
    Miss,
    /// The probe could not complete. Absorbed by the pool, only logged.
    Failed(ProbeError),
}

impl<T> ProbeOutcome<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Trait for probe implementations.
///
/// Implementations must bound every network wait with a timeout and should
/// observe `cancel` before starting new network work (retries included).
///
/// # Example
///
/// ```ignore
/// use glideway::scanner::{Probe, ProbeOutcome};
///
/// async fn check<P: Probe>(probe: &P, item: P::Item) -> bool {
///     probe.probe(item, &CancellationToken::new()).await.is_found()
/// }
/// ```
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    /// The work item this probe consumes.
    type Item: Send + Sync + Clone + fmt::Display + 'static;
    /// The result produced for interesting items.
    type Output: Send + 'static;

    /// Probe a single item.
    async fn probe(&self, item: Self::Item, cancel: &CancellationToken)
        -> ProbeOutcome<Self::Output>;
}

/// An open port, with whatever the fingerprinter could tell about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortResult {
    /// The port number that was scanned.
    pub port: Port,
    /// Application protocol, or "unknown".
    pub protocol: String,
    /// Detected service label, or "unknown".
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Banner captured from the service (if any).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    /// Connect time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl PortResult {
    /// An open port with nothing identified.
    pub fn open(port: Port) -> Self {
        Self {
            port,
            protocol: UNKNOWN.to_string(),
            service: UNKNOWN.to_string(),
            product: None,
            version: None,
            banner: None,
            tls: None,
            device_type: None,
            os: None,
            response_time_ms: None,
        }
    }

    /// Set the response time.
    pub fn with_response_time(mut self, time_ms: u64) -> Self {
        self.response_time_ms = Some(time_ms);
        self
    }
}

/// A discovered path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathResult {
    /// The normalized path as requested.
    pub path: String,
    #[serde(rename = "fullURL")]
    pub full_url: String,
    pub status_code: u16,
    pub content_type: String,
    pub content_length: u64,
}

/// Label used when a service or protocol could not be identified.
pub const UNKNOWN: &str = "unknown";

impl fmt::Display for PortResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/tcp {}", self.port, self.service)
    }
}

impl fmt::Display for PathResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.full_url, self.status_code)
    }
}
