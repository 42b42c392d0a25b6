//! Platform detection and per-user directory lookup.

use std::path::PathBuf;

use crate::constants;
use crate::error::{ScError, ScResult};

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Detect the current platform at compile time.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Get the platform-specific application data directory.
    ///
    /// - Windows: `%APPDATA%/storechat`
    /// - macOS: `~/Library/Application Support/storechat`
    /// - Linux: `~/.local/share/storechat`
    pub fn data_dir() -> ScResult<PathBuf> {
        let base = dirs::data_dir()
            .ok_or_else(|| ScError::Config("could not determine data directory".into()))?;
        Ok(base.join(constants::APP_NAME))
    }

    /// Get the platform-specific configuration directory.
    pub fn config_dir() -> ScResult<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| ScError::Config("could not determine config directory".into()))?;
        Ok(base.join(constants::APP_NAME))
    }

    /// Default directory for rotated log files.
    pub fn log_dir() -> ScResult<PathBuf> {
        Ok(Self::data_dir()?.join("logs"))
    }

    /// Get a human-readable platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
        }
    }

    /// User agent sent on the socket handshake and REST requests.
    pub fn user_agent() -> String {
        format!(
            "{}/{} ({})",
            constants::APP_NAME,
            constants::APP_VERSION,
            Self::current().name()
        )
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_name() {
        assert_eq!(Platform::Windows.name(), "Windows");
        assert_eq!(Platform::MacOs.to_string(), "macOS");
        assert_eq!(Platform::Linux.name(), "Linux");
    }

    #[test]
    fn test_user_agent_format() {
        let ua = Platform::user_agent();
        assert!(ua.starts_with("storechat/"));
        assert!(ua.ends_with(&format!("({})", Platform::current().name())));
    }

    #[test]
    fn test_log_dir_under_data_dir() {
        if let (Ok(data), Ok(logs)) = (Platform::data_dir(), Platform::log_dir()) {
            assert!(logs.starts_with(data));
        }
    }
}
