//! AI Integration Layer
//!
//! Model providers plus the call-level machinery wrapped around them:
//! retries, heartbeats, usage accounting and response parsing.

pub mod heartbeat;
pub mod provider;
pub mod retry;
pub mod usage;
pub mod validation;

pub use heartbeat::{Heartbeat, heartbeat_stream, with_heartbeat};
pub use provider::{
    CachedContext, GeminiProvider, LlmProvider, LlmResponse, ProviderConfig, ResponseMetadata,
    ResponseTiming, SharedProvider, TokenUsage, create_provider,
};
pub use retry::{Retrier, RetryPolicy, RetryPredicate, is_rate_limited, parse_retry_delay};
pub use usage::{SharedUsage, Usage, UsageSummary, UsageTracker};
