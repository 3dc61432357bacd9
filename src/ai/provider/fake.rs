//! Scripted provider for tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{CachedContext, LlmProvider, LlmResponse, TokenUsage};
use crate::types::{CacheHandle, Result, WikiError};

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Answers prompts through a closure and records every call
pub(crate) struct FakeProvider {
    responder: Responder,
    latency: Duration,
    cache_failure: Option<String>,
    calls: Mutex<Vec<String>>,
    cache_calls: AtomicU32,
}

impl FakeProvider {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            cache_failure: None,
            calls: Mutex::new(Vec::new()),
            cache_calls: AtomicU32::new(0),
        }
    }

    /// Every `generate` call sleeps this long before answering
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn failing_cache(mut self, message: &str) -> Self {
        self.cache_failure = Some(message.to_string());
        self
    }

    /// Prompts received so far, in call order
    pub(crate) fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn cache_calls(&self) -> u32 {
        self.cache_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for FakeProvider {
    async fn create_cache(
        &self,
        contents: &str,
        ttl: Duration,
        _display_name: &str,
    ) -> Result<CachedContext> {
        self.cache_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.cache_failure {
            return Err(WikiError::Config(message.clone()));
        }
        Ok(CachedContext {
            handle: CacheHandle::new("cachedContents/fake"),
            expires_at: Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64),
            usage: TokenUsage::default().with_cached(contents.len() as u32),
        })
    }

    async fn generate(&self, prompt: &str, _cache: Option<&CacheHandle>) -> Result<LlmResponse> {
        self.calls.lock().unwrap().push(prompt.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let text = (self.responder)(prompt)?;
        Ok(LlmResponse::text_only(text).with_usage(TokenUsage::new(10, 5).with_cached(100)))
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}
