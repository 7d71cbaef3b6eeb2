//! Target types for the two job kinds.
//!
//! - [`HostTarget`]: the host a port scan connects to (IP literal or hostname)
//! - [`BaseUrl`]: the URL prefix a path scan appends wordlist entries to

use crate::error::ConfigError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// A port scan target that has been resolved to an IP address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostTarget {
    /// The original input (hostname or IP string).
    pub original: String,
    /// The resolved IP address.
    pub ip: IpAddr,
}

impl HostTarget {
    pub fn new(original: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            original: original.into(),
            ip,
        }
    }

    /// Parse and resolve a target string.
    ///
    /// IP literals are used directly. Hostnames are validated and resolved
    /// once; the first address returned wins.
    pub async fn resolve(input: &str) -> Result<Self, ConfigError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ConfigError::InvalidTarget("target is empty".to_string()));
        }

        // Bracketed IPv6 literals are accepted too
        let literal = s.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = literal.parse::<IpAddr>() {
            return Ok(Self::new(s, ip));
        }

        if !is_valid_hostname(s) {
            return Err(ConfigError::InvalidTarget(s.to_string()));
        }

        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let response = resolver
            .lookup_ip(s)
            .await
            .map_err(|e| ConfigError::Resolution {
                host: s.to_string(),
                reason: e.to_string(),
            })?;

        let ip = response.iter().next().ok_or_else(|| ConfigError::Resolution {
            host: s.to_string(),
            reason: "no addresses found".to_string(),
        })?;

        Ok(Self::new(s, ip))
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.original == self.ip.to_string() {
            write!(f, "{}", self.ip)
        } else {
            write!(f, "{} ({})", self.original, self.ip)
        }
    }
}

/// Base URL of a path scan. Always http(s) and always ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl(Url);

impl BaseUrl {
    /// Parse a base URL, defaulting to `http://` when no scheme is given.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ConfigError::InvalidTarget("target is empty".to_string()));
        }

        let with_scheme = if s.contains("://") {
            s.to_string()
        } else {
            format!("http://{}", s)
        };

        let mut url = Url::parse(&with_scheme).map_err(|e| ConfigError::InvalidUrl {
            url: s.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: s.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl {
                url: s.to_string(),
                reason: "missing host".to_string(),
            });
        }

        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Append an already-normalized path segment.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.0.as_str(), path)
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check if a string is a valid hostname.
fn is_valid_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 {
        return false;
    }

    // Each label must be 1-63 characters, alphanumeric at both ends
    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && label.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
            && label.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
    })
}
