//! Configuration management for lab generation runs.
//!
//! Configuration is stored in TOML format and layered in this order:
//!
//! 1. **Built-in defaults** (see [`Config::default`])
//! 2. **Config file**: an explicit path, `./labgen.toml`, or the platform
//!    config directory (`~/.config/labgen/config.toml` on Linux)
//! 3. **Environment variables**: the credential and endpoint variables the
//!    backends have always used (`OPENAI_*`, `ELASTICSEARCH_*`, `MCP_*`)
//!
//! ## Example Configuration File
//!
//! ```toml
//! [completion]
//! base_url = "https://llm-proxy.example.com/v1"
//! model = "gpt-4o"
//!
//! [engine]
//! url = "https://search.example.com:9200"
//!
//! [paths]
//! cache_dir = ".generate-labs-cache"
//! state_file = ".generate-labs-state.json"
//!
//! [validation]
//! min_hits = 3
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the working directory when no path is given.
pub const LOCAL_CONFIG_FILE: &str = "labgen.toml";

/// Complete configuration for a generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generic chat completion backend.
    pub completion: CompletionConfig,
    /// Live query engine used for validation.
    pub engine: EngineConfig,
    /// Optional specialized agent tool server.
    pub agent: AgentConfig,
    /// Filesystem locations.
    pub paths: PathsConfig,
    /// Validation bounds and thresholds.
    pub validation: ValidationConfig,
    /// Sampling and retry settings for artifact generation.
    pub generation: GenerationConfig,
}

/// Chat completion backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible API (`OPENAI_BASE_URL`).
    pub base_url: Option<String>,
    /// API key (`OPENAI_API_KEY`).
    pub api_key: Option<String>,
    /// Model name (`OPENAI_MODEL`).
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: "gpt-4o".to_string(),
            timeout_secs: 120,
        }
    }
}

impl CompletionConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Query engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine endpoint (`ELASTICSEARCH_URL`).
    pub url: Option<String>,
    /// API key (`ELASTICSEARCH_APIKEY`).
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Agent tool server settings. Both fields must be set for the agent to be used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// JSON-RPC endpoint (`MCP_SERVER_URL`).
    pub server_url: Option<String>,
    /// API key (`MCP_API_KEY`).
    pub api_key: Option<String>,
}

impl AgentConfig {
    /// Returns the endpoint and key when the agent is fully configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.server_url.as_deref(), self.api_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => Some((url, key)),
            _ => None,
        }
    }
}

/// Filesystem locations used by a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the content cache.
    pub cache_dir: PathBuf,
    /// Batch state document.
    pub state_file: PathBuf,
    /// Dataset schema catalog (JSON).
    pub schemas: PathBuf,
    /// Directory receiving generated lab configs.
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".generate-labs-cache"),
            state_file: PathBuf::from(".generate-labs-state.json"),
            schemas: PathBuf::from("data/dataset_schemas.json"),
            output_dir: PathBuf::from("labs"),
        }
    }
}

/// Validation bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum hits/rows an example needs to be considered interactive.
    pub min_hits: u64,
    /// Total execution attempts for structured (object-shaped) queries.
    pub structured_attempts: u32,
    /// Total execution attempts for textual queries.
    pub textual_attempts: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_hits: 3,
            structured_attempts: 5,
            textual_attempts: 3,
        }
    }
}

/// Sampling and retry settings for artifact generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Temperature of the first generation attempt.
    pub temperature: f32,
    /// Temperature of retries after an empty result.
    pub retry_temperature: f32,
    /// Token budget for artifact generation.
    pub max_tokens: u32,
    /// Additional attempts when the backend returns no examples.
    pub empty_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            retry_temperature: 0.8,
            max_tokens: 4000,
            empty_retries: 3,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default locations.
    ///
    /// Environment overrides are applied on top of whatever file was found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(explicit) => Self::from_file(explicit)?,
            None => match Self::discover() {
                Some(found) => Self::from_file(&found)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        directories::ProjectDirs::from("dev", "outfitter", "labgen")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|p| p.exists())
    }

    /// Apply environment overrides using `lookup` to resolve variables.
    ///
    /// Empty values are ignored so a blank line in a `.env` file does not
    /// erase a value from the config file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_BASE_URL") {
            self.completion.base_url = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.completion.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.completion.model = v;
        }
        if let Some(v) = get("ELASTICSEARCH_URL") {
            self.engine.url = Some(v);
        }
        if let Some(v) = get("ELASTICSEARCH_APIKEY") {
            self.engine.api_key = Some(v);
        }
        if let Some(v) = get("MCP_SERVER_URL") {
            self.agent.server_url = Some(v);
        }
        if let Some(v) = get("MCP_API_KEY") {
            self.agent.api_key = Some(v);
        }
    }

    /// Check that every required credential and endpoint is present.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.completion.base_url.is_none() {
            missing.push("OPENAI_BASE_URL");
        }
        if self.completion.api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.engine.url.is_none() {
            missing.push("ELASTICSEARCH_URL");
        }
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        if self.validation.structured_attempts == 0 || self.validation.textual_attempts == 0 {
            return Err(Error::Config(
                "validation attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
