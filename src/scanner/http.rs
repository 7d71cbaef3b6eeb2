//! HTTP path probe.
//!
//! Requests `base + path` for one wordlist entry and reports it as found
//! when the response status is in the accepted set. Transport failures are
//! retried with linear backoff; non-matching statuses never are.
//!
//! Redirects are not followed and certificate validation is disabled.

use crate::error::{ConfigError, ProbeError};
use crate::scanner::traits::{PathResult, Probe, ProbeOutcome};
use crate::types::BaseUrl;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error as _;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Characters removed from wordlist entries before they are appended.
const UNSAFE_PATH_CHARS: &[char] = &['#', '&', '=', '+', '!', '@', '$', '^', '~'];

/// Bodies without a `Content-Length` are counted up to this many bytes.
const MAX_COUNTED_BODY: u64 = 1 << 20;

/// HTTP status codes treated as "path found".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u16>", into = "Vec<u16>")]
pub struct AcceptedStatusSet(BTreeSet<u16>);

impl AcceptedStatusSet {
    pub fn new(codes: impl IntoIterator<Item = u16>) -> Self {
        Self(codes.into_iter().collect())
    }

    pub fn contains(&self, code: u16) -> bool {
        self.0.contains(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }
}

impl Default for AcceptedStatusSet {
    fn default() -> Self {
        Self::new([200, 201, 202, 203, 204, 301, 302, 307, 308, 401, 403, 405])
    }
}

impl From<Vec<u16>> for AcceptedStatusSet {
    fn from(codes: Vec<u16>) -> Self {
        Self::new(codes)
    }
}

impl From<AcceptedStatusSet> for Vec<u16> {
    fn from(set: AcceptedStatusSet) -> Self {
        set.0.into_iter().collect()
    }
}

impl FromStr for AcceptedStatusSet {
    type Err = String;

    /// Parse a comma-separated list such as "200,301,403".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let codes = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u16>()
                    .ok()
                    .filter(|code| (100..=599).contains(code))
                    .ok_or_else(|| format!("invalid status code: {}", part))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if codes.is_empty() {
            return Err("no status codes specified".to_string());
        }
        Ok(Self::new(codes))
    }
}

impl fmt::Display for AcceptedStatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Retry policy for transport-level failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Percent-encode literal `%`, then strip characters unsafe in a path segment.
pub fn normalize_path(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('/')
        .replace('%', "%25")
        .chars()
        .filter(|c| !UNSAFE_PATH_CHARS.contains(c))
        .collect()
}

/// Build the shared client used by every worker of a path scan.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client, ConfigError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// HTTP path probe.
pub struct HttpPathProbe {
    client: Client,
    base: BaseUrl,
    accepted: AcceptedStatusSet,
    retry: RetryPolicy,
}

impl HttpPathProbe {
    pub fn new(client: Client, base: BaseUrl, accepted: AcceptedStatusSet) -> Self {
        Self {
            client,
            base,
            accepted,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn classify(&self, path: String, url: String, response: Response) -> ProbeOutcome<PathResult> {
        let status_code = response.status().as_u16();
        if !self.accepted.contains(status_code) {
            return ProbeOutcome::Miss;
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let content_length = match response.content_length() {
            Some(len) => len,
            None => body_length(response, &url, MAX_COUNTED_BODY).await,
        };

        ProbeOutcome::Found(PathResult {
            path,
            full_url: url,
            status_code,
            content_type,
            content_length,
        })
    }
}

#[async_trait]
impl Probe for HttpPathProbe {
    type Item = String;
    type Output = PathResult;

    async fn probe(&self, entry: String, cancel: &CancellationToken) -> ProbeOutcome<PathResult> {
        let path = normalize_path(&entry);
        if path.is_empty() {
            return ProbeOutcome::Miss;
        }
        let url = self.base.join(&path);

        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return ProbeOutcome::Failed(ProbeError::Cancelled);
            }

            match self.client.get(&url).send().await {
                Ok(response) => return self.classify(path, url, response).await,
                Err(e) if is_transport(&e) => {
                    if attempt >= self.retry.max_attempts {
                        return ProbeOutcome::Failed(ProbeError::Transport(e.to_string()));
                    }
                    tracing::debug!(%url, attempt, error = %e, "transport error, retrying");
                    let backoff = self.retry.backoff * attempt;
                    tokio::select! {
                        _ = cancel.cancelled() => return ProbeOutcome::Failed(ProbeError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    tracing::debug!(%url, error = %e, "protocol error");
                    return ProbeOutcome::Failed(ProbeError::Protocol(e.to_string()));
                }
            }
        }
    }
}

/// Stream the body, counting bytes up to `limit`.
async fn body_length(mut response: Response, url: &str, limit: u64) -> u64 {
    let mut length = 0u64;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                length = length.saturating_add(chunk.len() as u64);
                if length >= limit {
                    return limit;
                }
            }
            Ok(None) => return length,
            Err(e) => {
                tracing::debug!(%url, error = %e, "failed to read response body");
                return length;
            }
        }
    }
}

/// Connection-level failures worth another attempt.
///
/// Sending covers resets and early closes after connect; decode, redirect
/// and body errors are protocol errors.
fn is_transport(e: &reqwest::Error) -> bool {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        return true;
    }

    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            return matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::TimedOut
            );
        }
        source = err.source();
    }
    false
}
