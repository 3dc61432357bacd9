//! Retry with Adaptive Backoff
//!
//! Wraps a single model call. Rate-limit failures are retried after a delay
//! taken from the error itself (`"... retry in 2s"`) or, failing that, from
//! exponential growth of the base delay.
//!
//! ## Strategy
//!
//! 1. Run the call (racing the cancellation token)
//! 2. On failure, ask the predicate whether the error is retryable
//! 3. Pick the delay: message hint, then provider hint, then `base * 2^attempt`
//! 4. Sleep (racing the cancellation token) and go again
//! 5. Out of retries or not retryable: return the original error untouched

use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constants::retry as retry_constants;
use crate::types::{Result, WikiError};

/// Decides whether a failed call is worth repeating
pub type RetryPredicate = Arc<dyn Fn(&WikiError) -> bool + Send + Sync>;

static RETRY_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry in\s+([0-9]+(?:\.[0-9]+)?)\s*s").expect("static regex is valid")
});

static RATE_LIMIT_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b429\b|resource[_ ]exhausted|\brate\b|\brate[-_ ]?limit")
        .expect("static regex is valid")
});

/// Backoff policy for one call site
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Delay before the first retry when the error carries no hint
    pub base_delay: Duration,
    /// Cap on the computed exponential delay
    pub max_delay: Duration,
    /// Add up to 25% random jitter to computed delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry_constants::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(retry_constants::BASE_DELAY_MS),
            max_delay: Duration::from_secs(retry_constants::MAX_DELAY_SECS),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// `base_delay * 2^attempt`, capped at `max_delay`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter {
            delay + random_jitter(delay)
        } else {
            delay
        }
    }
}

/// Per-call bookkeeping, never persisted
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    delay: Duration,
}

/// Executes calls under a [`RetryPolicy`]
#[derive(Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    is_retryable: RetryPredicate,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl Retrier {
    /// Retrier using [`is_rate_limited`] as the predicate
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            is_retryable: Arc::new(is_rate_limited),
        }
    }

    /// Swap the retryability predicate
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&WikiError) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(predicate);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds, fails fatally, or retries run out
    pub async fn retry<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = RetryState::default();

        loop {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WikiError::Cancelled),
                outcome = call() => outcome,
            };

            let err = match outcome {
                Ok(value) => {
                    if state.attempt > 0 {
                        debug!(operation, attempts = state.attempt + 1, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if state.attempt >= self.policy.max_retries || !(self.is_retryable)(&err) {
                return Err(err);
            }

            state.delay = self.delay_for(&err, state.attempt);
            warn!(
                operation,
                attempt = state.attempt + 1,
                max_retries = self.policy.max_retries,
                delay_ms = state.delay.as_millis() as u64,
                error = %err,
                "Retryable failure, backing off"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(WikiError::Cancelled),
                _ = tokio::time::sleep(state.delay) => {}
            }
            state.attempt += 1;
        }
    }

    fn delay_for(&self, err: &WikiError, attempt: u32) -> Duration {
        parse_retry_delay(&err.to_string())
            .or_else(|| err.retry_after())
            .unwrap_or_else(|| self.policy.backoff_delay(attempt))
    }
}

/// Default predicate: rate limiting in any of its usual disguises
///
/// Matches a `RateLimit` category, HTTP 429, `RESOURCE_EXHAUSTED`, or the
/// word "rate" in the message.
pub fn is_rate_limited(err: &WikiError) -> bool {
    if err.category().is_some_and(|c| c.is_rate_limit()) {
        return true;
    }
    RATE_LIMIT_SIGNAL.is_match(&err.to_string())
}

/// Extract the delay from messages like `"429 RESOURCE_EXHAUSTED, retry in 2s"`
pub fn parse_retry_delay(message: &str) -> Option<Duration> {
    let captures = RETRY_IN.captures(message)?;
    let secs: f64 = captures.get(1)?.as_str().parse().ok()?;
    let capped = secs.min(retry_constants::MAX_EXPLICIT_DELAY_SECS as f64);
    Some(Duration::from_secs_f64(capped))
}

fn random_jitter(base_delay: Duration) -> Duration {
    let max_jitter_ms = (base_delay.as_millis() as u64) / 4;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LlmError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn rate_limited(message: &str) -> WikiError {
        WikiError::Llm(LlmError::rate_limited(message))
    }

    #[test]
    fn test_parse_retry_delay() {
        assert_eq!(
            parse_retry_delay("429 RESOURCE_EXHAUSTED, retry in 2s"),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            parse_retry_delay("Please retry in 1.5s."),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(
            parse_retry_delay("Retry in 9000s"),
            Some(Duration::from_secs(300))
        );
        assert_eq!(parse_retry_delay("429 RESOURCE_EXHAUSTED"), None);
    }

    #[test]
    fn test_default_predicate() {
        assert!(is_rate_limited(&rate_limited("quota")));
        assert!(is_rate_limited(&WikiError::Config("HTTP 429".to_string())));
        assert!(is_rate_limited(&WikiError::Config(
            "status RESOURCE_EXHAUSTED".to_string()
        )));
        assert!(is_rate_limited(&WikiError::Config(
            "request rate exceeded".to_string()
        )));
        assert!(!is_rate_limited(&WikiError::Config(
            "failed to generate page".to_string()
        )));
        assert!(!is_rate_limited(&WikiError::PlanParse("no json".to_string())));
    }

    #[test]
    fn test_backoff_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            jitter: false,
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(3));
        assert_eq!(policy.backoff_delay(40), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = RetryPolicy {
            jitter: true,
            ..Default::default()
        };
        let delay = policy.backoff_delay(0);
        assert!(delay >= policy.base_delay);
        assert!(delay <= policy.base_delay + policy.base_delay / 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_uses_message_delay_then_backoff() {
        let retrier = Retrier::new(RetryPolicy::default().with_max_retries(3));
        let calls = AtomicU32::new(0);
        let call_times = Mutex::new(Vec::new());

        let result = retrier
            .retry("test", &CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                call_times.lock().unwrap().push(Instant::now());
                async move {
                    match n {
                        0 => Err(rate_limited("429 RESOURCE_EXHAUSTED, retry in 2s")),
                        1 => Err(rate_limited("429 RESOURCE_EXHAUSTED")),
                        _ => Ok("done"),
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let times = call_times.lock().unwrap();
        let first_gap = times[1] - times[0];
        let second_gap = times[2] - times[1];
        assert!(first_gap >= Duration::from_secs(2));
        assert!(first_gap < Duration::from_millis(2100));
        // Second retry falls back to base * 2^1
        assert!(second_gap >= Duration::from_secs(2));
        assert!(second_gap < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_returns_last_error() {
        let retrier = Retrier::new(RetryPolicy::default().with_max_retries(2));
        let calls = AtomicU32::new(0);

        let result: Result<()> = retrier
            .retry("test", &CancellationToken::new(), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(rate_limited(&format!("429 attempt {}", n))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("attempt 2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let retrier = Retrier::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = retrier
            .retry("test", &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(WikiError::Config("bad model name".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(WikiError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_predicate() {
        let retrier = Retrier::new(RetryPolicy::default().with_max_retries(1))
            .with_predicate(|err| matches!(err, WikiError::Config(_)));
        let calls = AtomicU32::new(0);

        let _: Result<()> = retrier
            .retry("test", &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(WikiError::Config("flaky".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let retrier = Retrier::new(
            RetryPolicy::default().with_base_delay(Duration::from_secs(30)),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result: Result<()> = retrier
            .retry("test", &cancel, || async { Err(rate_limited("429")) })
            .await;

        assert!(matches!(result, Err(WikiError::Cancelled)));
    }
}
