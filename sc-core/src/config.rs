//! Application configuration management.
//!
//! Handles loading, saving, and accessing the storechat configuration: the
//! server origin, socket transport tuning, and logging. Configuration is
//! persisted as TOML on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants;
use crate::error::{ScError, ScResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Real-time socket settings.
    #[serde(default)]
    pub socket: SocketConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server origin (e.g., "https://shop.example.com").
    #[serde(default)]
    pub address: String,

    /// Path the socket endpoint is mounted on.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Bearer token used when no other credential source is wired in.
    #[serde(default)]
    pub token: String,

    /// Custom HTTP headers sent on REST requests and the socket handshake.
    #[serde(default)]
    pub custom_headers: HashMap<String, String>,

    /// REST request timeout in milliseconds.
    #[serde(default = "default_api_timeout")]
    pub api_timeout_ms: u64,

    /// Socket handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Whether to accept self-signed TLS certificates from the server.
    #[serde(default)]
    pub accept_self_signed_certs: bool,
}

/// Real-time socket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Transport negotiation order ("websocket", "polling").
    #[serde(default = "default_transports")]
    pub transports: Vec<String>,

    /// Automatic reconnection attempts after a transport drop.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Fixed delay between reconnection attempts in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_socket_path() -> String {
    constants::DEFAULT_SOCKET_PATH.to_string()
}

fn default_api_timeout() -> u64 {
    constants::DEFAULT_API_TIMEOUT_MS
}

fn default_connect_timeout() -> u64 {
    constants::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_transports() -> Vec<String> {
    constants::transports::DEFAULT_ORDER
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_reconnect_attempts() -> u32 {
    constants::SOCKET_RECONNECT_ATTEMPTS
}

fn default_reconnect_delay() -> u64 {
    constants::SOCKET_RECONNECT_DELAY_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            socket_path: default_socket_path(),
            token: String::new(),
            custom_headers: HashMap::new(),
            api_timeout_ms: default_api_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            accept_self_signed_certs: false,
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            transports: default_transports(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl ServerConfig {
    /// Handshake timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// REST request timeout as a Duration.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }
}

impl SocketConfig {
    /// Reconnection delay as a Duration.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> ScResult<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> ScResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&contents)?;
        config.server.address = Self::sanitize_server_address(&config.server.address);
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> ScResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ScError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> ScResult<PathBuf> {
        Ok(Platform::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> ScResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Platform::log_dir()
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check whether the server connection is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.address.is_empty()
    }

    /// Reject settings the socket layer cannot work with.
    pub fn validate(&self) -> ScResult<()> {
        if self.socket.transports.is_empty() {
            return Err(ScError::Config("socket.transports must not be empty".into()));
        }
        for name in &self.socket.transports {
            if !constants::transports::DEFAULT_ORDER.contains(&name.as_str()) {
                return Err(ScError::Config(format!("unknown socket transport '{name}'")));
            }
        }
        if !self.server.socket_path.starts_with('/') {
            return Err(ScError::Config(format!(
                "server.socket_path must start with '/': {}",
                self.server.socket_path
            )));
        }
        Ok(())
    }

    /// Apply a `section.key = value` override, as used by `storechat config set`.
    pub fn set_value(&mut self, key: &str, value: &str) -> ScResult<()> {
        let parse_u64 = |v: &str| {
            v.parse::<u64>()
                .map_err(|_| ScError::Config(format!("{key} expects an integer, got '{v}'")))
        };
        let parse_bool = |v: &str| {
            v.parse::<bool>()
                .map_err(|_| ScError::Config(format!("{key} expects true/false, got '{v}'")))
        };

        match key {
            "server.address" => self.server.address = Self::sanitize_server_address(value),
            "server.socket_path" => self.server.socket_path = value.to_string(),
            "server.token" => self.server.token = value.to_string(),
            "server.api_timeout_ms" => self.server.api_timeout_ms = parse_u64(value)?,
            "server.connect_timeout_ms" => self.server.connect_timeout_ms = parse_u64(value)?,
            "server.accept_self_signed_certs" => {
                self.server.accept_self_signed_certs = parse_bool(value)?
            }
            "socket.transports" => {
                self.socket.transports = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }
            "socket.reconnect_attempts" => {
                self.socket.reconnect_attempts = u32::try_from(parse_u64(value)?)
                    .map_err(|_| ScError::Config(format!("{key} out of range")))?
            }
            "socket.reconnect_delay_ms" => self.socket.reconnect_delay_ms = parse_u64(value)?,
            "logging.level" => self.logging.level = value.to_string(),
            "logging.directory" => self.logging.directory = value.to_string(),
            "logging.json_output" => self.logging.json_output = parse_bool(value)?,
            other => return Err(ScError::Config(format!("unknown config key '{other}'"))),
        }
        self.validate()
    }

    /// Sanitize and normalize a server address.
    ///
    /// Ensures the address has a scheme and strips quotes and trailing slashes.
    /// Bare hosts default to https unless they look local.
    pub fn sanitize_server_address(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else if trimmed.starts_with("localhost")
            || trimmed.starts_with("127.")
            || trimmed.starts_with("192.168.")
            || trimmed.starts_with("10.")
        {
            format!("http://{trimmed}")
        } else {
            format!("https://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

/// Thread-safe configuration holder for shared access across tasks.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
    path: Option<PathBuf>,
}

impl ConfigHandle {
    /// Create a new configuration handle, optionally bound to the file it was read from.
    pub fn new(config: AppConfig, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// File this configuration is saved to.
    pub fn path(&self) -> ScResult<PathBuf> {
        match &self.path {
            Some(p) => Ok(p.clone()),
            None => AppConfig::default_config_path(),
        }
    }

    /// Save the current configuration to disk.
    pub async fn save(&self) -> ScResult<()> {
        let path = self.path()?;
        let config = self.inner.read().await;
        config.save_to_file(&path)
    }
}
