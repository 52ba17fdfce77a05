//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/moodscope/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/moodscope/` (~/.config/moodscope/)
//! - Data: `$XDG_DATA_HOME/moodscope/` (~/.local/share/moodscope/)
//! - State/Logs: `$XDG_STATE_HOME/moodscope/` (~/.local/state/moodscope/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

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
    /// Summarizer backend configuration (optional; digests cannot be
    /// generated without it)
    #[serde(default)]
    pub summarizer: Option<SummarizerConfig>,

    /// Digest generation policy
    #[serde(default)]
    pub digest: DigestConfig,

    /// Webhook notifier configuration (optional)
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM provider configuration for the narrative summarizer
#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// Request timeout in seconds; bounds every summarizer call
    #[serde(default = "default_summarizer_timeout")]
    pub timeout_secs: u64,
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "ollama",
            LlmProvider::Claude => "claude",
            LlmProvider::OpenAI => "openai",
        }
    }
}

fn default_summarizer_timeout() -> u64 {
    60
}

/// Digest generation policy
#[derive(Debug, Deserialize, Clone)]
pub struct DigestConfig {
    /// Minimum scored entries for the interactive generate-now path
    #[serde(default = "default_interactive_min_entries")]
    pub interactive_min_entries: usize,

    /// Minimum scored entries for the unattended sweep path
    #[serde(default = "default_sweep_min_entries")]
    pub sweep_min_entries: usize,

    /// Retries per user during a sweep (applies to transient failures only)
    #[serde(default = "default_sweep_retries")]
    pub sweep_retries: usize,

    /// Shared secret required to run the batch sweep; unset means the sweep
    /// runs unauthenticated (single-operator deployments)
    pub sweep_token: Option<String>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            interactive_min_entries: default_interactive_min_entries(),
            sweep_min_entries: default_sweep_min_entries(),
            sweep_retries: default_sweep_retries(),
            sweep_token: None,
        }
    }
}

fn default_interactive_min_entries() -> usize {
    1
}

fn default_sweep_min_entries() -> usize {
    3
}

fn default_sweep_retries() -> usize {
    1
}

/// Webhook notifier configuration
///
/// When enabled, moodscope pings the configured webhook after each
/// successful digest generation. Delivery is best-effort.
#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    /// Enable/disable the webhook ping
    #[serde(default)]
    pub enabled: bool,

    /// Webhook URL to POST digest events to
    pub webhook_url: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_notifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            timeout_secs: default_notifier_timeout(),
        }
    }
}

impl NotifierConfig {
    /// Check if the notifier is properly configured and enabled
    pub fn is_ready(&self) -> bool {
        self.enabled && self.webhook_url.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.webhook_url.is_none() {
            return Err(Error::Config(
                "notifier.webhook_url is required when notifier is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_notifier_timeout() -> u64 {
    5
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

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.notifier.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/moodscope/config.toml` (~/.config/moodscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("moodscope").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/moodscope/` (~/.local/share/moodscope/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("moodscope")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/moodscope/` (~/.local/state/moodscope/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("moodscope")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/moodscope/data.db` (~/.local/share/moodscope/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
