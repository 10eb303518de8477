//! Configuration loading, validation, and management for codeloop.
//!
//! Loads configuration from `~/.codeloop/config.toml` with environment
//! variable overrides. Command-line flags are applied on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.codeloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the model server
    #[serde(default = "default_host")]
    pub host: String,

    /// Bearer token for servers that require one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Preferred model; the first served model is used when unset or unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Server kind: `auto`, `vllm`, `ollama` or `llama.cpp`
    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Conversation loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Terminal settings
    #[serde(default)]
    pub ui: UiSettings,

    /// Tool settings
    #[serde(default)]
    pub tools: ToolSettings,
}

fn default_host() -> String {
    "http://localhost:8000".into()
}

fn default_vendor() -> String {
    "auto".into()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("vendor", &self.vendor)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("ui", &self.ui)
            .field("tools", &self.tools)
            .finish()
    }
}

/// Conversation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Stream responses token by token
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Maximum request/execute cycles per user turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Budget for one whole user turn, in seconds
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

fn default_max_iterations() -> usize {
    10
}

fn default_turn_timeout_secs() -> u64 {
    300
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            stream: true,
            max_iterations: default_max_iterations(),
            turn_timeout_secs: default_turn_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSettings {
    /// Show the progress spinner
    #[serde(default = "default_true")]
    pub spinner: bool,

    /// Use ANSI colors
    #[serde(default = "default_true")]
    pub color: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self { spinner: true, color: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Default timeout for `execute_command`, in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_command_timeout_secs() -> u64 {
    60
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.codeloop/config.toml)
    /// and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides:
    /// `CODELOOP_HOST`, `CODELOOP_API_KEY`, `CODELOOP_MODEL`, `CODELOOP_VENDOR`.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("CODELOOP_HOST") {
            self.host = host;
        }
        if let Some(key) = get("CODELOOP_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(model) = get("CODELOOP_MODEL") {
            self.model = Some(model);
        }
        if let Some(vendor) = get("CODELOOP_VENDOR") {
            self.vendor = vendor;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".codeloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError("host must not be empty".into()));
        }

        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.turn_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.turn_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_key: None,
            model: None,
            vendor: default_vendor(),
            temperature: default_temperature(),
            max_tokens: None,
            agent: AgentSettings::default(),
            ui: UiSettings::default(),
            tools: ToolSettings::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
