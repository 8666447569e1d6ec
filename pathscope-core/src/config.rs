//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pathscope/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pathscope/` (~/.config/pathscope/)
//! - State/Logs: `$XDG_STATE_HOME/pathscope/` (~/.local/state/pathscope/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

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
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Event source connection
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Run defaults
    #[serde(default)]
    pub run: RunConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event source connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    /// WebSocket endpoint of the agent backend
    #[serde(default = "default_url")]
    pub url: String,

    /// Fixed delay between reconnect attempts, in milliseconds
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Bound on the queue between the delivery adapter and the store
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ConnectionConfig {
    /// Reconnect backoff as a [`Duration`]
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("connection.url must not be empty".to_string()));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(Error::Config(
                "connection.reconnect_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "connection.queue_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_url() -> String {
    "ws://localhost:8000/ws".to_string()
}

fn default_reconnect_interval_ms() -> u64 {
    3000
}

fn default_queue_capacity() -> usize {
    1024
}

/// Defaults for starting a run
#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Repository used when neither the command line nor the saved
    /// preference names one
    #[serde(default = "default_repo")]
    pub default_repo: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            default_repo: default_repo(),
        }
    }
}

fn default_repo() -> String {
    "golang/go".to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
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

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pathscope/config.toml` (~/.config/pathscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("pathscope").join("config.toml")
    }

    /// Returns the state directory path (for logs and preferences)
    ///
    /// `$XDG_STATE_HOME/pathscope/` (~/.local/state/pathscope/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("pathscope")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/pathscope/pathscope.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("pathscope.log")
    }

    /// Returns the preference file path
    ///
    /// `$XDG_STATE_HOME/pathscope/preferences.toml`
    pub fn preferences_path() -> PathBuf {
        Self::state_dir().join("preferences.toml")
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
        assert_eq!(config.connection.url, "ws://localhost:8000/ws");
        assert_eq!(config.connection.reconnect_interval_ms, 3000);
        assert_eq!(config.connection.queue_capacity, 1024);
        assert_eq!(config.run.default_repo, "golang/go");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[connection]
url = "ws://agent.internal:9000/ws"
reconnect_interval_ms = 500

[run]
default_repo = "X-lab2017/open-digger"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.connection.url, "ws://agent.internal:9000/ws");
        assert_eq!(
            config.connection.reconnect_interval(),
            Duration::from_millis(500)
        );
        // Unset keys keep their defaults
        assert_eq!(config.connection.queue_capacity, 1024);
        assert_eq!(config.run.default_repo, "X-lab2017/open-digger");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_connection_config_validation() {
        let config = ConnectionConfig {
            reconnect_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            url: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[connection]\nreconnect_interval_ms = 0").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is = = not toml").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_paths_are_namespaced() {
        assert!(Config::config_path().ends_with("pathscope/config.toml"));
        assert!(Config::log_path().ends_with("pathscope/pathscope.log"));
        assert!(Config::preferences_path().ends_with("pathscope/preferences.toml"));
    }
}
