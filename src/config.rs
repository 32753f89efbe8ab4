//! Configuration management for cost-audit
//!
//! Stores settings in ~/.config/cost-audit/config.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Analysis endpoint used when nothing else is configured
pub const DEFAULT_ENDPOINT: &str = "https://backend-costos.onrender.com/analizar";

/// Environment variable that overrides the configured endpoint
pub const ENDPOINT_ENV: &str = "COST_AUDIT_ENDPOINT";

/// Upper bound on a single oracle request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid analysis endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Request timeout must be at least one second")]
    ZeroTimeout,
    #[error("Could not determine config directory")]
    NoConfigDir,
    #[error("Failed to write config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Analysis endpoint URL (POST `{"prompt": ...}`, answers `{"respuesta": ...}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Seconds before a hung oracle request is reported as a transport failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cost-audit"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load config from an explicit path. A corrupt file is moved aside and
    /// defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Config>(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        write_config_atomic(path, &content)?;
        Ok(())
    }

    /// Reject values that would only fail later, at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            validate_endpoint(endpoint)?;
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Resolve the endpoint: environment first, then the config file, then the default.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        self.endpoint_with(None)
    }

    /// Like [`Config::endpoint`], with an explicit override (a CLI flag) ahead
    /// of everything else.
    pub fn endpoint_with(&self, explicit: Option<&str>) -> Result<Url, ConfigError> {
        let from_env = std::env::var(ENDPOINT_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        let raw = explicit
            .map(str::to_string)
            .or(from_env)
            .or_else(|| self.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        validate_endpoint(&raw)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/cost-audit/config.json".to_string())
    }
}

fn validate_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::debug!(error = %e, "failed to set temp config file permissions");
        }
    }

    file.write_all(content.as_bytes())?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_serializes_empty() {
        let config = Config::default();
        let encoded = serde_json::to_string(&config).unwrap();
        assert_eq!(encoded, "{}");
    }

    #[test]
    fn test_config_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            endpoint: Some("http://127.0.0.1:9000/analizar".to_string()),
            request_timeout_secs: Some(15),
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json"));
        assert_eq!(loaded, Config::default());
        assert_eq!(
            loaded.request_timeout(),
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_corrupt_file_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, Config::default());
        assert!(!path.exists());
        let backup = fs::read_to_string(dir.path().join("config.json.corrupt")).unwrap();
        assert_eq!(backup, "{ not json");
    }

    #[test]
    fn test_validate_rejects_bad_endpoints() {
        let config = Config {
            endpoint: Some("ftp://example.com/analizar".to_string()),
            request_timeout_secs: None,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        let config = Config {
            endpoint: Some("not a url".to_string()),
            request_timeout_secs: None,
        };
        assert!(config.validate().is_err());

        let config = Config {
            endpoint: None,
            request_timeout_secs: Some(0),
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_explicit_endpoint_wins() {
        let config = Config {
            endpoint: Some("http://127.0.0.1:1/analizar".to_string()),
            request_timeout_secs: None,
        };
        let url = config
            .endpoint_with(Some("http://127.0.0.1:2/analizar"))
            .unwrap();
        assert_eq!(url.port(), Some(2));
        assert!(config.endpoint_with(Some("mailto:x@y")).is_err());
    }

    #[test]
    fn test_default_endpoint_parses() {
        let url = validate_endpoint(DEFAULT_ENDPOINT).unwrap();
        assert_eq!(url.path(), "/analizar");
    }
}
