//! Exponential backoff and the retry decision for a single outbound call.

use std::time::Duration;

use rand::Rng;
use serde::Serialize;

use crate::catalog::CatalogError;
use crate::config::RetryConfig;

/// Upper bound on any 429 cooldown, whatever `Retry-After` says.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(3600);

/// Coarse error classes driving the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// HTTP 429.
    RateLimit,
    /// HTTP 5xx.
    Server,
    Timeout,
    /// Connection failures and other transport errors.
    Network,
    /// Never retried.
    Terminal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Terminal)
    }

    /// Delay multiplier; rate limiting backs off hardest.
    fn factor(self) -> f64 {
        match self {
            ErrorClass::RateLimit => 3.0,
            ErrorClass::Server => 2.0,
            ErrorClass::Timeout => 1.5,
            ErrorClass::Network | ErrorClass::Terminal => 1.0,
        }
    }

    /// Upper bound of the jitter, as a fraction of the delay.
    fn jitter_fraction(self) -> f64 {
        match self {
            ErrorClass::RateLimit => 0.25,
            _ => 0.1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::Server => "server",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Network => "network",
            ErrorClass::Terminal => "terminal",
        }
    }
}

/// `delay = min(base * 2^attempt, max) * factor(class) + jitter`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Deterministic part of the delay for the given attempt (0-based).
    pub fn base_delay(&self, attempt: u32, class: ErrorClass) -> Duration {
        let exp = 2f64.powi(attempt.min(31) as i32);
        let raw = (self.base.as_secs_f64() * exp).min(self.max.as_secs_f64());
        Duration::from_secs_f64(raw * class.factor())
    }

    /// Delay including a uniform jitter in `[0, fraction * base_delay]`.
    pub fn delay(&self, attempt: u32, class: ErrorClass) -> Duration {
        let base = self.base_delay(attempt, class);
        let spread = base.as_secs_f64() * class.jitter_fraction();
        if spread <= 0.0 {
            return base;
        }
        let jitter = rand::rng().random_range(0.0..=spread);
        base + Duration::from_secs_f64(jitter)
    }
}

/// What to do after a failed attempt.
#[derive(Debug)]
pub enum RetryDecision {
    /// Sleep for the delay, then try again.
    Retry(Duration),
    /// Surface the error to the caller.
    GiveUp(CatalogError),
}

/// Retry policy shared by the blocking and cooperative clients.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff: BackoffPolicy,
    pub max_retries: u32,
    /// Cooldown used for a 429 without a `Retry-After` header.
    pub retry_after_fallback: Duration,
    pub fail_fast_on_cooldown: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig, default_retry_after: Duration) -> Self {
        Self {
            backoff: BackoffPolicy::new(config.retry_delay_base(), config.retry_delay_max()),
            max_retries: config.max_retries,
            retry_after_fallback: config
                .retry_after_fallback()
                .unwrap_or(default_retry_after),
            fail_fast_on_cooldown: config.fail_fast_on_cooldown,
        }
    }

    /// Cooldown window to apply after a 429, capped at [`MAX_COOLDOWN`].
    pub fn cooldown_for(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.retry_after_fallback)
            .min(MAX_COOLDOWN)
    }

    /// Decide whether attempt number `attempt` (0-based) should be retried.
    ///
    /// Terminal errors are returned unchanged, as is a 429 when the policy
    /// fails fast on cooldown. Once `max_retries` retries have been spent the
    /// last error is wrapped in `RetriesExhausted`.
    pub fn decide(&self, attempt: u32, error: CatalogError) -> RetryDecision {
        let class = error.class();
        if !class.is_retryable() {
            return RetryDecision::GiveUp(error);
        }
        if self.fail_fast_on_cooldown && class == ErrorClass::RateLimit {
            return RetryDecision::GiveUp(error);
        }
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp(CatalogError::RetriesExhausted {
                attempts: attempt + 1,
                last: Box::new(error),
            });
        }

        let backoff = self.backoff.delay(attempt, class);
        let delay = match &error {
            CatalogError::RateLimited { retry_after } => {
                backoff.max(self.cooldown_for(*retry_after))
            }
            _ => backoff,
        };
        RetryDecision::Retry(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            backoff: BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(2)),
            max_retries: 3,
            retry_after_fallback: Duration::from_secs(10),
            fail_fast_on_cooldown: false,
        }
    }

    #[test]
    fn test_base_delay_strictly_increasing_until_cap() {
        let backoff = BackoffPolicy::new(Duration::from_millis(100), Duration::from_millis(1600));
        for class in [ErrorClass::Server, ErrorClass::Network, ErrorClass::RateLimit] {
            let delays: Vec<Duration> = (0..5).map(|a| backoff.base_delay(a, class)).collect();
            for pair in delays.windows(2) {
                assert!(pair[1] > pair[0], "{:?}: {:?}", class, delays);
            }
            // Capped from attempt 4 onwards (100ms * 16 = cap).
            assert_eq!(backoff.base_delay(4, class), backoff.base_delay(9, class));
        }
    }

    #[test]
    fn test_class_factor_ordering() {
        let backoff = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(10));
        let rate = backoff.base_delay(1, ErrorClass::RateLimit);
        let server = backoff.base_delay(1, ErrorClass::Server);
        let network = backoff.base_delay(1, ErrorClass::Network);
        assert!(rate > server);
        assert!(server > network);
        assert_eq!(network, Duration::from_millis(200));
    }

    #[test]
    fn test_jitter_stays_within_fraction() {
        let backoff = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(10));
        for _ in 0..50 {
            let base = backoff.base_delay(2, ErrorClass::Network);
            let delay = backoff.delay(2, ErrorClass::Network);
            assert!(delay >= base);
            assert!(delay <= base + base.mul_f64(0.1) + Duration::from_nanos(1));

            let base = backoff.base_delay(2, ErrorClass::RateLimit);
            let delay = backoff.delay(2, ErrorClass::RateLimit);
            assert!(delay <= base + base.mul_f64(0.25) + Duration::from_nanos(1));
        }
    }

    #[test]
    fn test_terminal_errors_never_retried() {
        let policy = policy();
        let err = CatalogError::ClientError {
            status: 404,
            message: "not found".to_string(),
        };
        match policy.decide(0, err) {
            RetryDecision::GiveUp(CatalogError::ClientError { status, .. }) => {
                assert_eq!(status, 404)
            }
            other => panic!("Expected immediate give up, got {:?}", other),
        }
    }

    #[test]
    fn test_retries_exhausted_carries_attempts_and_cause() {
        let policy = policy();
        match policy.decide(3, CatalogError::Timeout) {
            RetryDecision::GiveUp(CatalogError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, CatalogError::Timeout));
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_rate_limited_waits_at_least_retry_after() {
        let policy = policy();
        let err = CatalogError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
        };
        match policy.decide(0, err) {
            RetryDecision::Retry(delay) => assert!(delay >= Duration::from_secs(5)),
            other => panic!("Expected retry, got {:?}", other),
        }

        let err = CatalogError::RateLimited { retry_after: None };
        match policy.decide(0, err) {
            RetryDecision::Retry(delay) => assert!(delay >= Duration::from_secs(10)),
            other => panic!("Expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_huge_retry_after_is_capped() {
        let policy = policy();
        assert_eq!(
            policy.cooldown_for(Some(Duration::from_secs(u64::MAX))),
            MAX_COOLDOWN
        );
        let err = CatalogError::RateLimited {
            retry_after: Some(Duration::MAX),
        };
        match policy.decide(0, err) {
            RetryDecision::Retry(delay) => assert_eq!(delay, MAX_COOLDOWN),
            other => panic!("Expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_fail_fast_gives_up_on_rate_limit() {
        let mut policy = policy();
        policy.fail_fast_on_cooldown = true;
        let err = CatalogError::RateLimited { retry_after: None };
        assert!(matches!(
            policy.decide(0, err),
            RetryDecision::GiveUp(CatalogError::RateLimited { .. })
        ));
        // Other transient errors still retry.
        assert!(matches!(
            policy.decide(0, CatalogError::Timeout),
            RetryDecision::Retry(_)
        ));
    }

    #[test]
    fn test_from_config_prefers_configured_fallback() {
        let mut config = RetryConfig::default();
        let policy = RetryPolicy::from_config(&config, Duration::from_secs(60));
        assert_eq!(policy.retry_after_fallback, Duration::from_secs(60));

        config.retry_after_fallback_secs = Some(20);
        let policy = RetryPolicy::from_config(&config, Duration::from_secs(60));
        assert_eq!(policy.retry_after_fallback, Duration::from_secs(20));
    }
}
