//! Gemini API Provider
//!
//! Context caching via `cachedContents`, generation via
//! `models/{model}:generateContent`. Returns LlmResponse with token usage.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use super::{
    CachedContext, LlmProvider, LlmResponse, ProviderConfig, ResponseMetadata, ResponseTiming,
    TokenUsage,
};
use crate::constants::network as net_constants;
use crate::types::{CacheHandle, ErrorClassifier, LlmError, Result, WikiError};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const PROVIDER_NAME: &str = "gemini";

/// Gemini API Provider with secure API key handling
pub struct GeminiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: Url,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| {
                WikiError::Config(
                    "Gemini API key not found. Set GEMINI_API_KEY env var or llm.api_key in config"
                        .to_string(),
                )
            })?;

        let api_base = parse_api_base(config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE))?;
        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .map_err(|e| WikiError::Config(format!("Invalid Gemini endpoint {}: {}", path, e)))
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, url: Url, body: &B) -> Result<R> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                WikiError::Llm(ErrorClassifier::classify(
                    &format!("Gemini request failed: {}", e),
                    PROVIDER_NAME,
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WikiError::Llm(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("Gemini API error ({}): {}", status, body),
                PROVIDER_NAME,
            )));
        }

        Ok(response.json().await?)
    }
}

/// Normalize the base URL so relative joins keep its path
fn parse_api_base(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&with_slash)
        .map_err(|e| WikiError::Config(format!("Invalid Gemini api_base {}: {}", raw, e)))
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn create_cache(
        &self,
        contents: &str,
        ttl: Duration,
        display_name: &str,
    ) -> Result<CachedContext> {
        info!(
            model = %self.model,
            ttl_secs = ttl.as_secs(),
            bytes = contents.len(),
            "Registering context cache with Gemini"
        );

        let request = CreateCacheRequest {
            model: format!("models/{}", self.model),
            display_name: display_name.to_string(),
            contents: vec![Content::user(contents)],
            ttl: format!("{}s", ttl.as_secs()),
        };

        let response: CreateCacheResponse =
            self.post(self.endpoint("cachedContents")?, &request).await?;

        let expires_at = response
            .expire_time
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64));
        let cached_tokens = response
            .usage_metadata
            .map(|u| u.total_token_count)
            .unwrap_or_default();

        Ok(CachedContext {
            handle: CacheHandle::new(response.name),
            expires_at,
            usage: TokenUsage::default().with_cached(cached_tokens),
        })
    }

    async fn generate(&self, prompt: &str, cache: Option<&CacheHandle>) -> Result<LlmResponse> {
        let start_time = Instant::now();
        let request = GenerateRequest {
            contents: vec![Content::user(prompt)],
            cached_content: cache.map(|c| c.as_str().to_string()),
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        debug!(
            model = %self.model,
            prompt_chars = prompt.len(),
            cached = cache.is_some(),
            "Sending generateContent request"
        );

        let url = self.endpoint(&format!("models/{}:generateContent", self.model))?;
        let response: GenerateResponse = self.post(url, &request).await?;
        let elapsed = start_time.elapsed();

        let usage = response
            .usage_metadata
            .map(|u| {
                TokenUsage::new(u.prompt_token_count, u.candidates_token_count)
                    .with_cached(u.cached_content_token_count)
            })
            .unwrap_or_default();

        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                WikiError::Llm(LlmError::with_provider(
                    crate::types::ErrorCategory::Unknown,
                    "No content in Gemini response",
                    PROVIDER_NAME,
                ))
            })?;

        Ok(LlmResponse {
            text,
            usage,
            timing: ResponseTiming::from_duration(elapsed),
            metadata: ResponseMetadata {
                model: self.model.clone(),
                provider: PROVIDER_NAME.to_string(),
            },
        })
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCacheRequest {
    model: String,
    display_name: String,
    contents: Vec<Content>,
    ttl: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCacheResponse {
    name: String,
    #[serde(default)]
    expire_time: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    usage_metadata: Option<CacheUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheUsageMetadata {
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_content: Option<String>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<GenerateUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    cached_content_token_count: u32,
}
