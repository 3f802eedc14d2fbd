//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/ragchat/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/ragchat/` (~/.config/ragchat/)
//! - State/Logs: `$XDG_STATE_HOME/ragchat/` (~/.local/state/ragchat/)
//!
//! `RAGCHAT_BASE_URL` overrides `backend.base_url` when set.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding the backend URL
pub const BASE_URL_ENV: &str = "RAGCHAT_BASE_URL";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Chat backend connection settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Turn and history behavior
    #[serde(default)]
    pub chat: ChatConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chat backend connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Backend root URL (e.g., `http://localhost:8000`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds for non-streaming calls.
    /// Streaming turns are never cut off by this client.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(Error::Config("backend.base_url is required".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "backend.base_url must be an http(s) URL, got {:?}",
                url
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "backend.connect_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

/// How turns reach the backend
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Stream, falling back to the blocking endpoint when streaming is unsupported
    #[default]
    Auto,
    /// Stream only; unsupported streaming is an error
    Stream,
    /// Blocking endpoint only; no intermediate deltas
    Blocking,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Auto => "auto",
            Transport::Stream => "stream",
            Transport::Blocking => "blocking",
        }
    }
}

/// Turn and history behavior
#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Transport used for turns and retries
    #[serde(default)]
    pub transport: Transport,

    /// Messages per history page (1..=200)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Retrieval depth sent with each turn (backend default when unset)
    #[serde(default)]
    pub top_k: Option<u32>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            page_size: default_page_size(),
            top_k: None,
        }
    }
}

impl ChatConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > 200 {
            return Err(Error::Config(
                "chat.page_size must be between 1 and 200".to_string(),
            ));
        }
        if self.top_k == Some(0) {
            return Err(Error::Config("chat.top_k must be positive".to_string()));
        }
        Ok(())
    }
}

fn default_page_size() -> u32 {
    50
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            config.apply_base_url_override(url);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.backend.validate()?;
        self.chat.validate()
    }

    fn apply_base_url_override(&mut self, url: String) {
        if !url.trim().is_empty() {
            tracing::debug!(base_url = %url, "Using backend URL from {}", BASE_URL_ENV);
            self.backend.base_url = url;
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/ragchat/config.toml` (~/.config/ragchat/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("ragchat").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/ragchat/` (~/.local/state/ragchat/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("ragchat")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/ragchat/ragchat.log` (~/.local/state/ragchat/ragchat.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("ragchat.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.backend.connect_timeout_secs, 10);
        assert_eq!(config.chat.transport, Transport::Auto);
        assert_eq!(config.chat.page_size, 50);
        assert!(config.chat.top_k.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[backend]
base_url = "https://rag.example.com"
request_timeout_secs = 15

[chat]
transport = "blocking"
page_size = 20
top_k = 8

[logging]
level = "debug"
"#;
        let config = Config::parse(toml).unwrap();

        assert_eq!(config.backend.base_url, "https://rag.example.com");
        assert_eq!(config.backend.request_timeout_secs, 15);
        assert_eq!(config.backend.connect_timeout_secs, 10);
        assert_eq!(config.chat.transport, Transport::Blocking);
        assert_eq!(config.chat.page_size, 20);
        assert_eq!(config.chat.top_k, Some(8));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unknown_transport_is_rejected() {
        let toml = r#"
[chat]
transport = "carrier-pigeon"
"#;
        assert!(matches!(Config::parse(toml), Err(Error::Config(_))));
    }

    #[test]
    fn test_backend_validation() {
        let config = BackendConfig {
            base_url: "".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BackendConfig {
            base_url: "ftp://rag.example.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BackendConfig {
            connect_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chat_validation() {
        let config = ChatConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ChatConfig {
            page_size: 201,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ChatConfig {
            top_k: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nbase_url = \"http://10.0.0.5:9000\"").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.backend.base_url, "http://10.0.0.5:9000");
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = Config::load_from(Path::new("/nonexistent/ragchat/config.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_base_url_override() {
        let mut config = Config::default();
        config.apply_base_url_override("  ".to_string());
        assert_eq!(config.backend.base_url, "http://localhost:8000");

        config.apply_base_url_override("http://override:1234".to_string());
        assert_eq!(config.backend.base_url, "http://override:1234");
    }
}
