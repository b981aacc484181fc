use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TriageError};
use crate::models::EmailCategory;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl GmailConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Category used when the model's reply is not a known token
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            fallback_category: default_fallback_category(),
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn fallback(&self) -> Result<EmailCategory> {
        self.fallback_category.parse().map_err(|_| {
            TriageError::ConfigError(format!(
                "classifier.fallback_category '{}' is not a known category",
                self.fallback_category
            ))
        })
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(TriageError::ConfigError(format!(
                "Environment variable {} is not set",
                self.api_key_env
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_message_concurrency")]
    pub message_concurrency: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            batch_delay_ms: default_batch_delay_ms(),
            message_concurrency: default_message_concurrency(),
        }
    }
}

impl RunConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
}

fn default_max_concurrent() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u16 {
    10
}

fn default_fallback_category() -> String {
    EmailCategory::Fyi.as_token().to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_message_concurrency() -> usize {
    5
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| TriageError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TriageError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| TriageError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| TriageError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Gmail allows 250 quota units/sec per user; 50 parallel reads stays under it
        if self.gmail.max_concurrent_requests == 0 {
            return Err(TriageError::ConfigError(
                "gmail.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.gmail.max_concurrent_requests > 50 {
            return Err(TriageError::ConfigError(
                "gmail.max_concurrent_requests cannot exceed 50".to_string(),
            ));
        }
        if self.gmail.request_timeout_secs == 0 {
            return Err(TriageError::ConfigError(
                "gmail.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.classifier.model.trim().is_empty() {
            return Err(TriageError::ConfigError(
                "classifier.model cannot be empty".to_string(),
            ));
        }
        if !self.classifier.api_base.starts_with("http://")
            && !self.classifier.api_base.starts_with("https://")
        {
            return Err(TriageError::ConfigError(format!(
                "classifier.api_base must be an http(s) URL, got '{}'",
                self.classifier.api_base
            )));
        }
        if self.classifier.api_key_env.trim().is_empty() {
            return Err(TriageError::ConfigError(
                "classifier.api_key_env cannot be empty".to_string(),
            ));
        }
        if self.classifier.max_tokens == 0 || self.classifier.max_tokens > 100 {
            return Err(TriageError::ConfigError(
                "classifier.max_tokens must be between 1 and 100".to_string(),
            ));
        }
        if self.classifier.timeout_secs == 0 {
            return Err(TriageError::ConfigError(
                "classifier.timeout_secs must be greater than 0".to_string(),
            ));
        }
        self.classifier.fallback()?;

        if self.run.page_size == 0 || self.run.page_size > 500 {
            return Err(TriageError::ConfigError(
                "run.page_size must be between 1 and 500".to_string(),
            ));
        }
        if self.run.message_concurrency == 0 {
            return Err(TriageError::ConfigError(
                "run.message_concurrency must be at least 1".to_string(),
            ));
        }
        if self.run.message_concurrency > 50 {
            return Err(TriageError::ConfigError(
                "run.message_concurrency cannot exceed 50".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}
