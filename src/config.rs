//! Configuration for the vocare client
//!
//! Defaults are overlaid by an optional TOML file at the platform config dir
//! (`~/.config/vocare/config.toml` on Linux) and then by `VOCARE_*`
//! environment variables. All file fields are optional.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Default backend base URL (local development backend)
const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Default HTTP request timeout
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default delay before the error status auto-recovers to idle
const DEFAULT_ERROR_RECOVERY_MS: u64 = 3000;

/// Default capture chunk cadence
const DEFAULT_CHUNK_CADENCE_MS: u64 = 250;

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL, without trailing slash
    pub backend_url: String,

    /// Timeout applied to every backend request
    pub request_timeout: Duration,

    /// Delay before the error status auto-recovers to idle
    pub error_recovery: Duration,

    /// Cadence at which captured samples are flushed into chunks
    pub chunk_cadence: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            error_recovery: Duration::from_millis(DEFAULT_ERROR_RECOVERY_MS),
            chunk_cadence: Duration::from_millis(DEFAULT_CHUNK_CADENCE_MS),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then config file, then environment
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed, or if
    /// the resulting configuration is invalid.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::config_file_path() {
            if path.exists() {
                let contents = std::fs::read_to_string(&path)?;
                let file: ConfigFile = toml::from_str(&contents)?;
                config.apply_file(file);
                tracing::debug!(path = %path.display(), "loaded config file");
            }
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Platform config file location
    #[must_use]
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "vocare", "vocare")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(url) = file.backend.url {
            self.backend_url = url;
        }
        if let Some(secs) = file.backend.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = file.ui.error_recovery_ms {
            self.error_recovery = Duration::from_millis(ms);
        }
        if let Some(ms) = file.audio.chunk_cadence_ms {
            self.chunk_cadence = Duration::from_millis(ms);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("VOCARE_BACKEND_URL") {
            if !url.is_empty() {
                self.backend_url = url;
            }
        }
        if let Some(secs) = env_u64("VOCARE_REQUEST_TIMEOUT_SECS") {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_u64("VOCARE_ERROR_RECOVERY_MS") {
            self.error_recovery = Duration::from_millis(ms);
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.backend_url.is_empty() {
            return Err(Error::Config("backend URL must not be empty".to_string()));
        }
        while self.backend_url.ends_with('/') {
            self.backend_url.pop();
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Partial TOML config file schema
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    backend: BackendFileConfig,

    #[serde(default)]
    audio: AudioFileConfig,

    #[serde(default)]
    ui: UiFileConfig,
}

/// Backend connection settings
#[derive(Debug, Default, Deserialize)]
struct BackendFileConfig {
    /// Backend base URL (e.g. `http://localhost:8000`)
    url: Option<String>,

    /// Request timeout in seconds
    request_timeout_secs: Option<u64>,
}

/// Audio capture settings
#[derive(Debug, Default, Deserialize)]
struct AudioFileConfig {
    /// Chunk cadence in milliseconds
    chunk_cadence_ms: Option<u64>,
}

/// Status/feedback settings
#[derive(Debug, Default, Deserialize)]
struct UiFileConfig {
    /// Error auto-recovery delay in milliseconds
    error_recovery_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();

        assert_eq!(config.backend_url, "http://localhost:8000");
        assert_eq!(config.error_recovery, Duration::from_secs(3));
        assert_eq!(config.chunk_cadence, Duration::from_millis(250));
    }

    #[test]
    fn file_overlay_is_partial() {
        let file: ConfigFile = toml::from_str(
            r#"
            [backend]
            url = "https://voice.example.org/"
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(file);
        config.validate().unwrap();

        assert_eq!(config.backend_url, "https://voice.example.org");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn empty_url_is_rejected() {
        let mut config = Config {
            backend_url: String::new(),
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }
}
