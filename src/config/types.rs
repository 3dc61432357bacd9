//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/wikiforge/) and project (.wikiforge/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ai::provider::ProviderConfig;
use crate::ai::retry::RetryPolicy;
use crate::constants::{network, pipeline, retry};
use crate::types::{Result, WikiError};
use crate::wiki::{PipelineOptions, ScheduleMode};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Model provider settings
    pub llm: LlmConfig,

    /// Backoff for rate-limited model calls
    pub retry: RetryConfig,

    /// Scheduling, heartbeat and cache settings
    pub pipeline: PipelineConfig,

    /// Where generated pages are written
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            pipeline: PipelineConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `WikiError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(WikiError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(WikiError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_output_tokens == 0 {
            return Err(WikiError::Config(
                "LLM max_output_tokens must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.heartbeat_interval_secs == 0 {
            return Err(WikiError::Config(
                "Pipeline heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.cache_ttl_secs == 0 {
            return Err(WikiError::Config(
                "Pipeline cache_ttl_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name
    pub provider: String,

    /// Model name
    pub model: String,

    /// Custom API endpoint
    pub api_base: Option<String>,

    /// Falls back to GEMINI_API_KEY when unset; never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Temperature for LLM generation (0.0 = deterministic, 2.0 = most creative)
    pub temperature: f32,

    /// Output token cap per call
    pub max_output_tokens: u32,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_base: None,
            api_key: None,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: 0.2,
            max_output_tokens: 8192,
        }
    }
}

impl LlmConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.provider.clone(),
            model: Some(self.model.clone()),
            timeout_secs: self.timeout_secs,
            temperature: self.temperature,
            api_key: self.api_key.clone(),
            api_base: self.api_base.clone(),
            max_output_tokens: self.max_output_tokens,
        }
    }
}

// =============================================================================
// Retry Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Backoff base in milliseconds (doubles per retry)
    pub base_delay_ms: u64,

    /// Cap on computed backoff in seconds
    pub max_delay_secs: u64,

    /// Add up to 25% random jitter to computed delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: retry::DEFAULT_MAX_RETRIES,
            base_delay_ms: retry::BASE_DELAY_MS,
            max_delay_secs: retry::MAX_DELAY_SECS,
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            jitter: self.jitter,
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `leveled` (concurrent per level) or `sequential`
    pub schedule_mode: ScheduleMode,

    pub heartbeat_interval_secs: u64,

    /// Page generations in flight per level (0 = whole level)
    pub max_concurrency: usize,

    /// Context cache time-to-live in seconds
    pub cache_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schedule_mode: ScheduleMode::Leveled,
            heartbeat_interval_secs: pipeline::HEARTBEAT_INTERVAL_SECS,
            max_concurrency: 0,
            cache_ttl_secs: pipeline::CACHE_TTL_SECS,
        }
    }
}

impl PipelineConfig {
    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            schedule_mode: self.schedule_mode,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            max_concurrency: self.max_concurrency,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }
}

// =============================================================================
// Output Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving `<slug>.md` files and `wiki.json`
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("wiki"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.schedule_mode, ScheduleMode::Leveled);
        assert_eq!(config.output.dir, PathBuf::from("wiki"));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::default();
        config.llm.temperature = 2.5;
        assert!(matches!(config.validate(), Err(WikiError::Config(_))));

        let mut config = Config::default();
        config.pipeline.heartbeat_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.cache_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_conversions() {
        let config = Config::default();
        let policy = config.retry.policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));

        let options = config.pipeline.options();
        assert_eq!(options.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(options.cache_ttl, Duration::from_secs(3600));

        let provider = config.llm.provider_config();
        assert_eq!(provider.model.as_deref(), Some("gemini-2.5-flash"));
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = Config::default();
        config.llm.api_key = Some("secret".to_string());
        let toml = toml::to_string(&config).unwrap();
        assert!(!toml.contains("secret"));
        assert!(!format!("{:?}", config).contains("secret"));
    }
}
