//! Error types for glideway.
//!
//! Uses `thiserror` for ergonomic error definitions. Setup failures are
//! returned synchronously from the start operations; per-item failures
//! (`ProbeError`) are absorbed by the worker pool and never reach callers.

use crate::job::JobKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the job controller surface.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("{0} is already running")]
    AlreadyRunning(JobKind),

    #[error("no {0} is running")]
    NotRunning(JobKind),
}

/// Invalid parameters or settings, rejected before any job starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("failed to resolve hostname '{host}': {reason}")]
    Resolution { host: String, reason: String },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid port range: {0}")]
    InvalidPortRange(String),

    #[error("concurrency must be positive")]
    NonPositiveConcurrency,

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("could not determine configuration directory")]
    DirectoryNotFound,

    #[error("failed to read config file {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("invalid config format: {0}")]
    InvalidFormat(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Wordlist (or other input resource) problems.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("failed to read wordlist {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("wordlist {path} contains no usable entries")]
    EmptyWordlist { path: PathBuf },
}

/// Failure of a single probe. Expected and frequent; only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cancelled")]
    Cancelled,
}

/// Errors surfaced by the command-line front end.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("{0}")]
    JobFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for controller operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
