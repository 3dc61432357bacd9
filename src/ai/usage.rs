//! Token Usage Accounting
//!
//! Aggregates token counts for one pipeline run. Page generations in a level
//! record concurrently, so counters are atomics.
//!
//! ## Usage
//!
//! ```ignore
//! let tracker = UsageTracker::new();
//! tracker.record_response(&response);
//! let usage = tracker.usage();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::ai::provider::{CachedContext, LlmResponse, TokenUsage};

/// Token totals reported in the `complete` event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// Tokens served from the context cache plus tokens registered into it
    pub cache_tokens: u64,
}

/// Thread-safe accumulator of [`Usage`] plus call statistics
#[derive(Debug, Default)]
pub struct UsageTracker {
    api_calls: AtomicU32,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    cache_tokens: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Call statistics for the CLI summary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageSummary {
    pub usage: Usage,
    pub api_calls: u32,
    pub avg_latency_ms: f64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful model call
    pub fn record_response(&self, response: &LlmResponse) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.add_tokens(&response.usage);
        self.total_latency_ms
            .fetch_add(response.timing.total_ms, Ordering::Relaxed);
    }

    /// Record the context cache registration (not counted as a call)
    pub fn record_cache(&self, cached: &CachedContext) {
        self.add_tokens(&cached.usage);
    }

    fn add_tokens(&self, usage: &TokenUsage) {
        self.input_tokens
            .fetch_add(usage.input_tokens as u64, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(usage.output_tokens as u64, Ordering::Relaxed);
        self.cache_tokens
            .fetch_add(usage.cached_tokens as u64, Ordering::Relaxed);
    }

    pub fn usage(&self) -> Usage {
        let input_tokens = self.input_tokens.load(Ordering::Relaxed);
        let output_tokens = self.output_tokens.load(Ordering::Relaxed);
        Usage {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            cache_tokens: self.cache_tokens.load(Ordering::Relaxed),
        }
    }

    pub fn summary(&self) -> UsageSummary {
        let api_calls = self.api_calls.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);
        let avg_latency_ms = if api_calls > 0 {
            total_latency as f64 / api_calls as f64
        } else {
            0.0
        };
        UsageSummary {
            usage: self.usage(),
            api_calls,
            avg_latency_ms,
        }
    }
}

impl UsageSummary {
    /// Format summary for display
    pub fn display(&self) -> String {
        format!(
            "API Calls: {}\n\
             Tokens: {} (input: {}, output: {})\n\
             Cached Tokens: {}\n\
             Avg Latency: {:.0}ms",
            self.api_calls,
            self.usage.total_tokens,
            self.usage.input_tokens,
            self.usage.output_tokens,
            self.usage.cache_tokens,
            self.avg_latency_ms,
        )
    }
}

/// Shared tracker for concurrent page generations
pub type SharedUsage = Arc<UsageTracker>;
