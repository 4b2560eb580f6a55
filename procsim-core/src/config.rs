//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/procsim/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/procsim/` (~/.config/procsim/)
//! - Data: `$XDG_DATA_HOME/procsim/` (~/.local/share/procsim/)
//! - State/Logs: `$XDG_STATE_HOME/procsim/` (~/.local/state/procsim/), unless
//!   `[logging] dir` is set

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name used when no process name has been set.
pub const DEFAULT_PROCESS_NAME: &str = "My Process";

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

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
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
    /// Oracle (LLM endpoint) configuration
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Process defaults
    #[serde(default)]
    pub process: ProcessConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Oracle provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    /// Provider type
    #[serde(default)]
    pub provider: OracleProvider,
    /// Model to use (defaults per provider)
    pub model: Option<String>,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var or `procsim key set`)
    pub api_key: Option<String>,
    /// HTTP request timeout in seconds
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::default(),
            model: None,
            endpoint: None,
            api_key: None,
            timeout_secs: default_oracle_timeout(),
        }
    }
}

impl OracleConfig {
    /// Model name, falling back to the provider default
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Endpoint, falling back to the provider default
    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider.default_endpoint())
    }

    /// API key from config or the provider env var.
    ///
    /// A key stored through the process store is consulted by the caller
    /// when this returns `None`.
    pub fn configured_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(self.provider.api_key_env())
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }
}

/// Supported oracle providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    #[default]
    Gemini,
    OpenAI,
}

impl OracleProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            OracleProvider::Gemini => "https://generativelanguage.googleapis.com",
            OracleProvider::OpenAI => "https://api.openai.com",
        }
    }

    /// Returns the default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            OracleProvider::Gemini => "gemini-2.5-flash",
            OracleProvider::OpenAI => "gpt-4o-mini",
        }
    }

    /// Environment variable consulted for the API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            OracleProvider::Gemini => "GEMINI_API_KEY",
            OracleProvider::OpenAI => "OPENAI_API_KEY",
        }
    }
}

fn default_oracle_timeout() -> u64 {
    120
}

/// Process defaults
#[derive(Debug, Deserialize)]
pub struct ProcessConfig {
    /// Name given to a fresh or reset process
    #[serde(default = "default_process_name")]
    pub default_name: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            default_name: default_process_name(),
        }
    }
}

fn default_process_name() -> String {
    DEFAULT_PROCESS_NAME.to_string()
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (off, trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for log files (defaults to the XDG state dir)
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl LoggingConfig {
    /// Directory log files are written to
    pub fn log_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(Config::state_dir)
    }
}

fn default_log_level() -> String {
    "info".to_string()
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

        if config.oracle.timeout_secs == 0 {
            return Err(Error::Config(
                "oracle.timeout_secs must be at least 1".to_string(),
            ));
        }
        crate::logging::level_filter(&config.logging.level)?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/procsim/config.toml` (~/.config/procsim/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("procsim").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/procsim/` (~/.local/share/procsim/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("procsim")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/procsim/` (~/.local/state/procsim/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("procsim")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/procsim/data.db` (~/.local/share/procsim/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }
}
