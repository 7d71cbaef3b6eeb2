//! Engine settings and paths.
//!
//! Settings come from an explicit file, else `settings.json` in the
//! XDG-compliant config directory, else built-in defaults.

use crate::error::{ConfigError, ConfigResult};
use crate::scanner::{AcceptedStatusSet, RetryPolicy};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application directory paths following XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/glideway)
    pub config_dir: PathBuf,
}

impl Paths {
    /// Locate the XDG directories for this user.
    pub fn discover() -> ConfigResult<Self> {
        let project =
            ProjectDirs::from("com", "glideway", "glideway").ok_or(ConfigError::DirectoryNotFound)?;

        Ok(Self {
            config_dir: project.config_dir().to_path_buf(),
        })
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }
}

/// Tunables of the scan engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Banner read timeout in milliseconds.
    pub banner_timeout_ms: u64,
    /// Whole-request HTTP timeout in milliseconds.
    pub http_timeout_ms: u64,
    /// HTTP attempts per path, including the first.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Progress reporter tick.
    pub progress_interval_ms: u64,
    pub default_concurrency: usize,
    pub default_path_concurrency: usize,
    /// Fingerprint open ports.
    pub fingerprint: bool,
    pub user_agent: String,
    pub accepted_status: AcceptedStatusSet,
    /// Maximum probes started per second, 0 for unlimited.
    pub rate_limit: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2000,
            banner_timeout_ms: 5000,
            http_timeout_ms: 10_000,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            progress_interval_ms: 100,
            default_concurrency: 500,
            default_path_concurrency: 50,
            fingerprint: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            accepted_status: AcceptedStatusSet::default(),
            rate_limit: 0,
        }
    }
}

impl EngineSettings {
    /// Load from `explicit` if given, else from the default location.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn discover(explicit: Option<&Path>) -> ConfigResult<Self> {
        let settings = match explicit {
            Some(path) => Self::load_from(path)?,
            None => {
                let file = Paths::discover()?.settings_file();
                if file.exists() {
                    Self::load_from(&file)?
                } else {
                    Self::default()
                }
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let timeouts = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("banner_timeout_ms", self.banner_timeout_ms),
            ("http_timeout_ms", self.http_timeout_ms),
            ("progress_interval_ms", self.progress_interval_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidSetting(format!("{} must be positive", name)));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting("max_attempts must be at least 1".into()));
        }
        if self.default_concurrency == 0 || self.default_path_concurrency == 0 {
            return Err(ConfigError::NonPositiveConcurrency);
        }
        if self.accepted_status.is_empty() {
            return Err(ConfigError::InvalidSetting("accepted_status is empty".into()));
        }
        if let Some(code) = self.accepted_status.iter().find(|c| !(100..=599).contains(c)) {
            return Err(ConfigError::InvalidSetting(format!("invalid status code: {}", code)));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn banner_timeout(&self) -> Duration {
        Duration::from_millis(self.banner_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.default_concurrency, 500);
        assert_eq!(settings.http_timeout(), Duration::from_secs(10));
        assert_eq!(settings.retry_policy().max_attempts, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"connect_timeout_ms": 250, "accepted_status": [200, 404]}}"#).unwrap();

        let settings = EngineSettings::discover(Some(file.path())).unwrap();
        assert_eq!(settings.connect_timeout(), Duration::from_millis(250));
        assert!(settings.accepted_status.contains(404));
        assert!(!settings.accepted_status.contains(403));
        assert_eq!(settings.banner_timeout_ms, 5000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let settings = EngineSettings {
            max_attempts: 0,
            ..EngineSettings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidSetting(_))));

        let settings = EngineSettings {
            accepted_status: AcceptedStatusSet::new([200, 700]),
            ..EngineSettings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidSetting(_))));

        let settings = EngineSettings {
            http_timeout_ms: 0,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineSettings::discover(Some(&dir.path().join("absent.json")));
        assert!(matches!(result, Err(ConfigError::ReadFailed { .. })));
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let result = EngineSettings::load_from(file.path());
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));
    }
}
