//! Configuration for the repository gateway
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use crate::engine::MediaProfile;
use crate::session::SessionOptions;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Main configuration for the repository gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Client-facing WebSocket server
    #[serde(default)]
    pub server: ServerConfig,

    /// Media server connection
    #[serde(default)]
    pub engine: EngineConfig,

    /// Storage repository
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Session limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path clients connect to; other paths are answered with 404
    #[serde(default = "default_path")]
    pub path: String,

    /// Outbound messages buffered per connection
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8443
}

fn default_path() -> String {
    "/repository".to_string()
}

fn default_outbound_queue_size() -> usize {
    128
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            outbound_queue_size: default_outbound_queue_size(),
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Media server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Kurento WebSocket URL
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_engine_url() -> String {
    "ws://localhost:8888/kurento".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Storage repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Repository REST base URL; recordings go to local files when unset
    #[serde(default)]
    pub url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_repository_timeout")]
    pub timeout_seconds: u64,

    /// Directory for local fallback recordings
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: String,

    /// Recorder media profile
    #[serde(default)]
    pub media_profile: MediaProfile,
}

fn default_repository_timeout() -> u64 {
    10
}

fn default_fallback_dir() -> String {
    "/tmp".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_seconds: default_repository_timeout(),
            fallback_dir: default_fallback_dir(),
            media_profile: MediaProfile::default(),
        }
    }
}

/// Session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_max_sessions() -> usize {
    100
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        // Server
        if let Some(host) = lookup("GATEWAY_HOST") {
            config.server.host = host;
        }
        if let Some(p) = lookup("GATEWAY_PORT").and_then(|v| v.parse().ok()) {
            config.server.port = p;
        }
        if let Some(path) = lookup("GATEWAY_PATH") {
            config.server.path = path;
        }

        // Engine
        if let Some(url) = lookup("KMS_URL") {
            config.engine.url = url;
        }
        if let Some(t) = lookup("KMS_REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.engine.request_timeout_ms = t;
        }

        // Repository
        if let Some(url) = lookup("REPOSITORY_URL").filter(|v| !v.is_empty()) {
            config.repository.url = Some(url);
        }
        if let Some(dir) = lookup("REPOSITORY_FALLBACK_DIR") {
            config.repository.fallback_dir = dir;
        }
        if let Some(profile) = lookup("REPOSITORY_MEDIA_PROFILE").and_then(|v| v.parse().ok()) {
            config.repository.media_profile = profile;
        }

        // Limits
        if let Some(m) = lookup("GATEWAY_MAX_SESSIONS").and_then(|v| v.parse().ok()) {
            config.limits.max_sessions = m;
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> std::result::Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }

    /// Check values that would only fail later at runtime
    pub fn validate(&self) -> Result<()> {
        let engine_url = Url::parse(&self.engine.url)
            .map_err(|e| Error::InvalidConfig(format!("engine.url '{}': {}", self.engine.url, e)))?;
        if !matches!(engine_url.scheme(), "ws" | "wss") {
            return Err(Error::InvalidConfig(format!(
                "engine.url must be ws:// or wss://, got '{}'",
                self.engine.url
            )));
        }

        if let Some(url) = &self.repository.url {
            let repo_url = Url::parse(url)
                .map_err(|e| Error::InvalidConfig(format!("repository.url '{}': {}", url, e)))?;
            if !matches!(repo_url.scheme(), "http" | "https") {
                return Err(Error::InvalidConfig(format!(
                    "repository.url must be http:// or https://, got '{}'",
                    url
                )));
            }
        }

        if !self.server.path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "server.path must start with '/', got '{}'",
                self.server.path
            )));
        }
        if self.server.outbound_queue_size == 0 {
            return Err(Error::InvalidConfig(
                "server.outbound_queue_size must be > 0".to_string(),
            ));
        }
        if self.engine.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "engine.request_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.limits.max_sessions == 0 {
            return Err(Error::InvalidConfig(
                "limits.max_sessions must be > 0".to_string(),
            ));
        }
        if self.repository.fallback_dir.is_empty() {
            return Err(Error::InvalidConfig(
                "repository.fallback_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings handed to every new session
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            profile: self.repository.media_profile,
            fallback_dir: self.repository.fallback_dir.clone(),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.server.path, "/repository");
        assert_eq!(config.engine.url, "ws://localhost:8888/kurento");
        assert!(config.repository.url.is_none());
        assert_eq!(config.repository.media_profile, MediaProfile::Webm);
        assert_eq!(config.limits.max_sessions, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[server]
port = 9443
path = "/rec"

[engine]
url = "wss://kms.example.com/kurento"

[repository]
url = "http://repo.example.com:7676"
media_profile = "MP4_VIDEO_ONLY"

[limits]
max_sessions = 5
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9443);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.path, "/rec");
        assert_eq!(config.engine.request_timeout_ms, 30_000);
        assert_eq!(config.repository.url.as_deref(), Some("http://repo.example.com:7676"));
        assert_eq!(config.repository.media_profile, MediaProfile::Mp4VideoOnly);
        assert_eq!(config.limits.max_sessions, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_and_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 10000").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 10000);

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 10000);
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            Config::from_file("/nonexistent/gateway.toml"),
            Err(ConfigError::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(matches!(Config::from_file(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("GATEWAY_PORT", "9000"),
            ("KMS_URL", "ws://kms:8888/kurento"),
            ("REPOSITORY_URL", "http://repo:7676"),
            ("REPOSITORY_MEDIA_PROFILE", "webm_audio_only"),
            ("GATEWAY_MAX_SESSIONS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.engine.url, "ws://kms:8888/kurento");
        assert_eq!(config.repository.url.as_deref(), Some("http://repo:7676"));
        assert_eq!(config.repository.media_profile, MediaProfile::WebmAudioOnly);
        // Unparseable values keep the default
        assert_eq!(config.limits.max_sessions, 100);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.engine.url = "http://kms:8888".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.repository.url = Some("ftp://repo".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.path = "repository".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.limits.max_sessions = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_session_options() {
        let mut config = Config::default();
        config.repository.media_profile = MediaProfile::Mp4;
        config.repository.fallback_dir = "/data".to_string();

        let options = config.session_options();
        assert_eq!(options.profile, MediaProfile::Mp4);
        assert_eq!(options.fallback_dir, "/data");
    }
}
