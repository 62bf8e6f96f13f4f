//! Configuration management for the console client.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/panel-console/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::PanelOrigin;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{ReconnectPolicy, SessionOptions};
use crate::transport::WebSocketConfig;

/// Panel used when nothing else is configured.
pub const DEFAULT_PANEL_URL: &str = "http://localhost:8080";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("panel url is not a valid http(s) or ws(s) origin: {0}")]
    InvalidPanelUrl(String),

    #[error("request_timeout_secs must be between 1 and 300, got {0}")]
    InvalidRequestTimeout(u64),

    #[error("connect_timeout_secs must be between 1 and 300, got {0}")]
    InvalidConnectTimeout(u64),

    #[error("buffer_capacity must be between 1 and 100000, got {0}")]
    InvalidBufferCapacity(usize),

    #[error("initial_delay_ms must be greater than 0, got {0}")]
    InvalidInitialDelay(u64),

    #[error("max_delay_ms ({max}) must not be lower than initial_delay_ms ({initial})")]
    InvalidMaxDelay { initial: u64, max: u64 },

    #[error("multiplier must be a finite number >= 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("max_attempts must be greater than 0 when set")]
    InvalidMaxAttempts,

    #[error("heartbeat interval_secs and timeout_secs must be greater than 0")]
    InvalidHeartbeat,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the console client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Which panel to talk to and how.
    pub panel: PanelConfig,

    /// Console pane settings.
    pub console: ConsoleConfig,

    /// Reconnect behaviour after the stream closes.
    pub reconnect: ReconnectConfig,

    /// WebSocket keep-alive.
    pub heartbeat: HeartbeatConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

/// Panel connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PanelConfig {
    /// Origin the panel is served from, e.g. `https://panel.example.com`.
    pub url: String,

    /// Bearer token for REST calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Timeout for REST calls in seconds.
    pub request_timeout_secs: u64,
}

/// Console pane settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Lines kept per console before the oldest are dropped.
    pub buffer_capacity: usize,

    /// Colour lines by kind.
    pub color: bool,

    /// Time allowed for the stream handshake, in seconds.
    pub connect_timeout_secs: u64,
}

/// How reconnect delays are chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectMode {
    /// Always wait `initial_delay_ms`.
    Fixed,
    /// Start at `initial_delay_ms`, grow by `multiplier` up to `max_delay_ms`.
    Backoff,
}

/// Reconnect settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub mode: ReconnectMode,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Give up after this many consecutive attempts (backoff mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

/// Heartbeat settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Directory for the daily log files.
    pub directory: PathBuf,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PANEL_URL.to_string(),
            token: None,
            request_timeout_secs: 15,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: crate::session::DEFAULT_BUFFER_CAPACITY,
            color: true,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            mode: ReconnectMode::Backoff,
            initial_delay_ms: 5_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: default_log_dir(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("panel-console")
        .join("config.toml")
}

/// Returns the default log directory path.
fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("panel-console")
        .join("logs")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - PANEL_CONSOLE_URL: Override the panel origin
    /// - PANEL_CONSOLE_TOKEN: Override the API token
    /// - PANEL_CONSOLE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PANEL_CONSOLE_URL") {
            if !url.is_empty() {
                tracing::info!(url = %url, "Overriding panel url from environment");
                self.panel.url = url;
            }
        }

        if let Ok(token) = std::env::var("PANEL_CONSOLE_TOKEN") {
            if !token.is_empty() {
                tracing::info!("Overriding panel token from environment");
                self.panel.token = Some(token);
            }
        }

        if let Ok(level) = std::env::var("PANEL_CONSOLE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!(level = %level, "Overriding log_level from environment");
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin()?;

        if !(1..=300).contains(&self.panel.request_timeout_secs) {
            return Err(ConfigError::InvalidRequestTimeout(
                self.panel.request_timeout_secs,
            ));
        }

        if !(1..=300).contains(&self.console.connect_timeout_secs) {
            return Err(ConfigError::InvalidConnectTimeout(
                self.console.connect_timeout_secs,
            ));
        }

        if !(1..=100_000).contains(&self.console.buffer_capacity) {
            return Err(ConfigError::InvalidBufferCapacity(
                self.console.buffer_capacity,
            ));
        }

        let reconnect = &self.reconnect;
        if reconnect.initial_delay_ms == 0 {
            return Err(ConfigError::InvalidInitialDelay(reconnect.initial_delay_ms));
        }
        if reconnect.mode == ReconnectMode::Backoff {
            if reconnect.max_delay_ms < reconnect.initial_delay_ms {
                return Err(ConfigError::InvalidMaxDelay {
                    initial: reconnect.initial_delay_ms,
                    max: reconnect.max_delay_ms,
                });
            }
            if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
                return Err(ConfigError::InvalidMultiplier(reconnect.multiplier));
            }
            if reconnect.max_attempts == Some(0) {
                return Err(ConfigError::InvalidMaxAttempts);
            }
        }

        if self.heartbeat.enabled
            && (self.heartbeat.interval_secs == 0 || self.heartbeat.timeout_secs == 0)
        {
            return Err(ConfigError::InvalidHeartbeat);
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// The configured panel origin.
    pub fn origin(&self) -> Result<PanelOrigin, ConfigError> {
        PanelOrigin::parse(&self.panel.url)
            .map_err(|_| ConfigError::InvalidPanelUrl(self.panel.url.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.panel.request_timeout_secs)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let initial = Duration::from_millis(self.reconnect.initial_delay_ms);
        match self.reconnect.mode {
            ReconnectMode::Fixed => ReconnectPolicy::fixed(initial),
            ReconnectMode::Backoff => ReconnectPolicy::Backoff {
                initial,
                max: Duration::from_millis(self.reconnect.max_delay_ms),
                multiplier: self.reconnect.multiplier,
                max_attempts: self.reconnect.max_attempts,
            },
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            buffer_capacity: self.console.buffer_capacity,
            reconnect: self.reconnect_policy(),
        }
    }

    pub fn websocket_config(&self) -> WebSocketConfig {
        let heartbeat = self
            .heartbeat
            .enabled
            .then(|| Duration::from_secs(self.heartbeat.interval_secs));

        WebSocketConfig::default()
            .with_connect_timeout(Duration::from_secs(self.console.connect_timeout_secs))
            .with_heartbeat(heartbeat)
            .with_heartbeat_timeout(Duration::from_secs(self.heartbeat.timeout_secs))
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: [&str; 3] = [
        "PANEL_CONSOLE_URL",
        "PANEL_CONSOLE_TOKEN",
        "PANEL_CONSOLE_LOG_LEVEL",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.panel.url, DEFAULT_PANEL_URL);
        assert_eq!(config.panel.token, None);
        assert_eq!(config.panel.request_timeout_secs, 15);
        assert_eq!(config.console.buffer_capacity, 1000);
        assert!(config.console.color);
        assert_eq!(config.reconnect.mode, ReconnectMode::Backoff);
        assert_eq!(config.reconnect.initial_delay_ms, 5_000);
        assert_eq!(config.reconnect.max_delay_ms, 60_000);
        assert!(config.heartbeat.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config
            .logging
            .directory
            .to_string_lossy()
            .contains("panel-console"));
    }

    #[test]
    fn test_validate_default_config() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[panel]
url = "https://panel.example.com"

[reconnect]
mode = "fixed"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.panel.url, "https://panel.example.com");
        assert_eq!(config.reconnect.mode, ReconnectMode::Fixed);
        // Everything else keeps its default.
        assert_eq!(config.reconnect.initial_delay_ms, 5_000);
        assert_eq!(config.console, ConsoleConfig::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[panel]
url = "https://panel.example.com:8443"
token = "secret"
request_timeout_secs = 30

[console]
buffer_capacity = 500
color = false
connect_timeout_secs = 5

[reconnect]
mode = "backoff"
initial_delay_ms = 1000
max_delay_ms = 20000
multiplier = 1.5
max_attempts = 8

[heartbeat]
enabled = false
interval_secs = 15
timeout_secs = 5

[logging]
level = "debug"
directory = "/var/log/panel-console"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.panel.token.as_deref(), Some("secret"));
        assert_eq!(config.panel.request_timeout_secs, 30);
        assert_eq!(config.console.buffer_capacity, 500);
        assert!(!config.console.color);
        assert_eq!(config.reconnect.multiplier, 1.5);
        assert_eq!(config.reconnect.max_attempts, Some(8));
        assert!(!config.heartbeat.enabled);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.directory,
            PathBuf::from("/var/log/panel-console")
        );
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[panel\nurl = \"x\"");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_unknown_mode() {
        let result = Config::from_toml("[reconnect]\nmode = \"sometimes\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.panel.token = Some("abc".to_string());
        original.reconnect.max_attempts = Some(3);
        original.console.buffer_capacity = 42;

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.panel.url = "https://panel.example.com".to_string();
        original.logging.level = "warn".to_string();

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[console]\nbuffer_capacity = \"lots\"\n").unwrap();

        let err = Config::load(&config_path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("panel-console/config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("PANEL_CONSOLE_URL", "https://env.example.com");
        std::env::set_var("PANEL_CONSOLE_TOKEN", "env-token");
        std::env::set_var("PANEL_CONSOLE_LOG_LEVEL", "trace");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.panel.url, "https://env.example.com");
        assert_eq!(config.panel.token.as_deref(), Some("env-token"));
        assert_eq!(config.logging.level, "trace");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("PANEL_CONSOLE_URL", "");
        std::env::set_var("PANEL_CONSOLE_TOKEN", "");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.panel.url, DEFAULT_PANEL_URL);
        assert_eq!(config.panel.token, None);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        clear_env();

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_panel_url() {
        let mut config = Config::default();
        config.panel.url = "ftp://panel.example.com".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidPanelUrl(
                "ftp://panel.example.com".to_string()
            ))
        );

        config.panel.url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPanelUrl(_))
        ));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.panel.request_timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidRequestTimeout(0)));

        let mut config = Config::default();
        config.console.buffer_capacity = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidBufferCapacity(0)));

        let mut config = Config::default();
        config.console.connect_timeout_secs = 301;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidConnectTimeout(301))
        );
    }

    #[test]
    fn test_validate_reconnect() {
        let mut config = Config::default();
        config.reconnect.initial_delay_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidInitialDelay(0)));

        let mut config = Config::default();
        config.reconnect.max_delay_ms = 1_000;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidMaxDelay {
                initial: 5_000,
                max: 1_000
            })
        );

        let mut config = Config::default();
        config.reconnect.multiplier = 0.5;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMultiplier(0.5)));

        let mut config = Config::default();
        config.reconnect.max_attempts = Some(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxAttempts));

        // Fixed mode ignores the backoff-only fields.
        let mut config = Config::default();
        config.reconnect.mode = ReconnectMode::Fixed;
        config.reconnect.max_delay_ms = 1;
        config.reconnect.multiplier = 0.0;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_heartbeat() {
        let mut config = Config::default();
        config.heartbeat.interval_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidHeartbeat));

        config.heartbeat.enabled = false;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.logging.level = "WARN".to_string();
        assert_eq!(config.validate(), Ok(()));

        config.logging.level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );
    }

    #[test]
    fn test_reconnect_policy_conversion() {
        let mut config = Config::default();
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::default());

        config.reconnect.mode = ReconnectMode::Fixed;
        assert_eq!(
            config.reconnect_policy(),
            ReconnectPolicy::fixed(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_websocket_config_conversion() {
        let mut config = Config::default();
        assert_eq!(config.websocket_config(), WebSocketConfig::default());

        config.heartbeat.enabled = false;
        config.console.connect_timeout_secs = 3;
        let ws = config.websocket_config();
        assert_eq!(ws.heartbeat_interval, None);
        assert_eq!(ws.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_session_options_conversion() {
        let mut config = Config::default();
        config.console.buffer_capacity = 10;
        let options = config.session_options();
        assert_eq!(options.buffer_capacity, 10);
        assert_eq!(options.reconnect, ReconnectPolicy::default());
    }
}
