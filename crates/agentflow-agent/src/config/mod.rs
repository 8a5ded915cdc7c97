//! Engine configuration.
//!
//! [`EngineConfig`] is loaded once at startup, from a TOML or JSON file
//! (chosen by extension), and then patched with environment overrides:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `AGENTFLOW_LLM_BASE_URL` | `llm.base_url` |
//! | `AGENTFLOW_LLM_API_KEY` (or `OPENAI_API_KEY`) | `llm.api_key` |
//! | `AGENTFLOW_LLM_MODEL` | `llm.model` |
//! | `AGENTFLOW_HTTP_TIMEOUT_SECS` | `http.timeout_secs` |
//! | `AGENTFLOW_APP_URL` | `blocklet.app_url` |
//!
//! The resulting value is handed to [`crate::Services`] and read from there;
//! nothing in the engine consults the environment directly.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model identifier.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Default timeout applied to leaf HTTP calls.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model provider settings.
    pub llm: LlmConfig,
    /// Settings for leaf HTTP agents.
    pub http: HttpConfig,
    /// Operation discovery settings for blocklet agents.
    pub blocklet: BlockletConfig,
}

/// OpenAI-compatible model provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API base URL, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Bearer token for the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Default model identifier.
    pub model: String,
    /// Default cap on generated tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Default sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.into(),
            api_key: None,
            model: DEFAULT_LLM_MODEL.into(),
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Settings for leaf HTTP calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Fixed client-side timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Blocklet discovery settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockletConfig {
    /// Base URL of the application hosting the operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl EngineConfig {
    /// Load configuration from a file, then apply environment overrides.
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a configuration file without consulting the environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = ?path, "configuration file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| AgentError::Config {
            reason: format!("failed to read config file {}: {e}", path.display()),
        })?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(|e| AgentError::Config {
                reason: format!("failed to parse JSON config: {e}"),
            })?
        } else {
            toml::from_str(&content).map_err(|e| AgentError::Config {
                reason: format!("failed to parse TOML config: {e}"),
            })?
        };

        info!(path = ?path, "configuration loaded from file");
        Ok(config)
    }

    /// Apply `AGENTFLOW_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base_url) = lookup("AGENTFLOW_LLM_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Some(key) = lookup("AGENTFLOW_LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("AGENTFLOW_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(timeout) = lookup("AGENTFLOW_HTTP_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.http.timeout_secs = secs,
                Err(_) => warn!(value = %timeout, "ignoring invalid AGENTFLOW_HTTP_TIMEOUT_SECS"),
            }
        }
        if let Some(app_url) = lookup("AGENTFLOW_APP_URL") {
            self.blocklet.app_url = Some(app_url);
        }

        debug!(
            base_url = %self.llm.base_url,
            model = %self.llm.model,
            timeout_secs = self.http.timeout_secs,
            "environment overrides applied"
        );
    }
}
