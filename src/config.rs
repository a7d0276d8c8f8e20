use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SummaryError};
use crate::models::Strategy;
use crate::prompts::PromptVersion;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Item count at which ADAPTIVE switches to a batched call
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Per-generation timeout, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default)]
    pub default_strategy: Strategy,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            batch_threshold: default_batch_threshold(),
            max_batch_size: default_max_batch_size(),
            timeout_secs: default_timeout_secs(),
            default_strategy: Strategy::default(),
        }
    }
}

/// Model provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::OpenRouter => "openrouter",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o-mini",
            Provider::Gemini => "gemini-1.5-flash",
            Provider::OpenRouter => "openai/gpt-4o-mini",
        }
    }

    fn default_api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: Provider,
    /// Falls back to the provider's default model when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Tried in order after `model` (OpenRouter only)
    #[serde(default)]
    pub fallback_models: Vec<String>,
    /// Name of the environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_prompt_version")]
    pub prompt_version: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::for_provider(Provider::default())
    }
}

impl BackendConfig {
    /// Defaults appropriate for `provider`
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            model: Some(provider.default_model().to_string()),
            fallback_models: Vec::new(),
            api_key_env: Some(provider.default_api_key_env().to_string()),
            base_url: None,
            temperature: None,
            max_tokens: None,
            max_concurrent: default_max_concurrent(),
            prompt_version: default_prompt_version(),
        }
    }

    /// Configured model, or the provider's default
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Configured key variable, or the provider's default
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    pub fn prompt_version(&self) -> Result<PromptVersion> {
        self.prompt_version.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

fn default_batch_threshold() -> usize {
    10
}

fn default_max_batch_size() -> usize {
    50
}

fn default_timeout_secs() -> f64 {
    30.0
}

fn default_max_concurrent() -> usize {
    crate::backend::DEFAULT_MAX_CONCURRENT
}

fn default_prompt_version() -> String {
    "latest".to_string()
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("summaries.json")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SummaryError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| SummaryError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    SummaryError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SummaryError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| SummaryError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let summarizer = &self.summarizer;
        if summarizer.batch_threshold == 0 {
            return Err(SummaryError::ConfigError(
                "summarizer.batch_threshold must be at least 1".to_string(),
            ));
        }
        if summarizer.max_batch_size == 0 {
            return Err(SummaryError::ConfigError(
                "summarizer.max_batch_size must be at least 1".to_string(),
            ));
        }
        if !(summarizer.timeout_secs.is_finite() && summarizer.timeout_secs > 0.0) {
            return Err(SummaryError::ConfigError(
                "summarizer.timeout_secs must be a positive number".to_string(),
            ));
        }

        let backend = &self.backend;
        if backend.model().trim().is_empty() {
            return Err(SummaryError::ConfigError(
                "backend.model cannot be empty".to_string(),
            ));
        }
        if backend.api_key_env().trim().is_empty() {
            return Err(SummaryError::ConfigError(
                "backend.api_key_env cannot be empty".to_string(),
            ));
        }
        if backend.max_concurrent == 0 {
            return Err(SummaryError::ConfigError(
                "backend.max_concurrent must be at least 1".to_string(),
            ));
        }
        if let Some(temperature) = backend.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(SummaryError::ConfigError(format!(
                    "backend.temperature must be between 0.0 and 2.0, got {}",
                    temperature
                )));
            }
        }
        if backend.max_tokens == Some(0) {
            return Err(SummaryError::ConfigError(
                "backend.max_tokens must be greater than 0".to_string(),
            ));
        }
        if !backend.fallback_models.is_empty() && backend.provider != Provider::OpenRouter {
            tracing::warn!(
                "backend.fallback_models is only used by the openrouter provider; ignoring for {}",
                backend.provider.as_str()
            );
        }
        backend.prompt_version()?;

        if self.store.snapshot_path.as_os_str().is_empty() {
            return Err(SummaryError::ConfigError(
                "store.snapshot_path cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
