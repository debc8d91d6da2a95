use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::mask_secret;

/// Root configuration for a resolution session.
///
/// Built once at startup and shared behind an `Arc`; never mutated afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    pub tmdb: TmdbConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl ResolverConfig {
    /// Config with defaults everywhere except the API key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            tmdb: TmdbConfig {
                api_key: api_key.into(),
                base_url: default_base_url(),
                language: default_language(),
                fallback_language: default_language(),
                timeout_secs: default_timeout_secs(),
            },
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            matching: MatchingConfig::default(),
            pool: PoolConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Catalog service connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmdbConfig {
    /// TMDB v3 API key. Never logged in cleartext.
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Language tag sent with every request (e.g. "en-US").
    #[serde(default = "default_language")]
    pub language: String,
    /// Language used for detail lookups whose overview is empty.
    #[serde(default = "default_language")]
    pub fallback_language: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TmdbConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Retry and backoff settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_base_ms")]
    pub retry_delay_base_ms: u64,
    #[serde(default = "default_retry_delay_max_ms")]
    pub retry_delay_max_ms: u64,
    /// Cooldown applied when a 429 carries no `Retry-After` header.
    /// When unset, each client variant uses its own historic default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_fallback_secs: Option<u64>,
    /// Fail immediately instead of waiting when a call lands in a cooldown.
    #[serde(default)]
    pub fail_fast_on_cooldown: bool,
}

impl RetryConfig {
    pub fn retry_delay_base(&self) -> Duration {
        Duration::from_millis(self.retry_delay_base_ms)
    }

    pub fn retry_delay_max(&self) -> Duration {
        Duration::from_millis(self.retry_delay_max_ms)
    }

    pub fn retry_after_fallback(&self) -> Option<Duration> {
        self.retry_after_fallback_secs.map(Duration::from_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_base_ms: default_retry_delay_base_ms(),
            retry_delay_max_ms: default_retry_delay_max_ms(),
            retry_after_fallback_secs: None,
            fail_fast_on_cooldown: false,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_base_ms() -> u64 {
    1_000
}

fn default_retry_delay_max_ms() -> u64 {
    30_000
}

/// Per-client admission control.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Tokens available within one window.
    #[serde(default = "default_burst_limit")]
    pub burst_limit: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Maximum simultaneously in-flight calls per client.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst_limit: default_burst_limit(),
            window_ms: default_window_ms(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_burst_limit() -> u32 {
    40
}

fn default_window_ms() -> u64 {
    10_000
}

fn default_max_concurrent() -> usize {
    8
}

/// Thresholds and weights used by the scorer and the fallback search.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchingConfig {
    /// Early-exit threshold for the exact title + year strategy.
    #[serde(default = "default_high_confidence")]
    pub high_confidence_threshold: f64,
    /// Early-exit threshold for the exact title strategy.
    #[serde(default = "default_exact_title_threshold")]
    pub exact_title_threshold: f64,
    /// Early-exit threshold for the cleaned title strategy.
    #[serde(default = "default_cleaned_title_threshold")]
    pub cleaned_title_threshold: f64,
    /// Floor a candidate must exceed to be offered when no strategy exits early.
    #[serde(default = "default_medium_confidence")]
    pub medium_confidence_threshold: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default)]
    pub weights: ScoringWeights,
    /// Entries kept by the scorer's normalization memo.
    #[serde(default = "default_normalization_cache_size")]
    pub normalization_cache_size: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: default_high_confidence(),
            exact_title_threshold: default_exact_title_threshold(),
            cleaned_title_threshold: default_cleaned_title_threshold(),
            medium_confidence_threshold: default_medium_confidence(),
            max_candidates: default_max_candidates(),
            weights: ScoringWeights::default(),
            normalization_cache_size: default_normalization_cache_size(),
        }
    }
}

fn default_high_confidence() -> f64 {
    0.85
}

fn default_exact_title_threshold() -> f64 {
    0.75
}

fn default_cleaned_title_threshold() -> f64 {
    0.65
}

fn default_medium_confidence() -> f64 {
    0.5
}

fn default_max_candidates() -> usize {
    10
}

fn default_normalization_cache_size() -> usize {
    1024
}

/// Composite score weights. Conventionally they sum to 1.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct ScoringWeights {
    #[serde(default = "default_similarity_weight")]
    pub similarity: f64,
    #[serde(default = "default_year_weight")]
    pub year: f64,
    #[serde(default = "default_language_weight")]
    pub language: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            similarity: default_similarity_weight(),
            year: default_year_weight(),
            language: default_language_weight(),
        }
    }
}

fn default_similarity_weight() -> f64 {
    0.7
}

fn default_year_weight() -> f64 {
    0.2
}

fn default_language_weight() -> f64 {
    0.1
}

/// Which pool backs the thread-based resolver.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PoolMode {
    /// Shared bounded pool; callers block when it is exhausted.
    #[default]
    Bounded,
    /// One client per calling thread.
    ThreadLocal,
}

/// Client pool sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub mode: PoolMode,
    /// Clients created eagerly when the pool is built.
    #[serde(default = "default_initial_size")]
    pub initial_size: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// How long `resolve` waits for a free client. Waits forever when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_timeout_ms: Option<u64>,
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            mode: PoolMode::default(),
            initial_size: default_initial_size(),
            max_size: default_max_size(),
            acquire_timeout_ms: None,
        }
    }
}

fn default_initial_size() -> usize {
    1
}

fn default_max_size() -> usize {
    4
}

/// Per-client response cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_size")]
    pub max_size: usize,
    /// Start in cache-only mode (no network calls at all).
    #[serde(default)]
    pub cache_only: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_size(),
            cache_only: false,
        }
    }
}

fn default_cache_size() -> usize {
    512
}

/// Sanitized config for display (API key masked).
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub tmdb: SanitizedTmdbConfig,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub matching: MatchingConfig,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTmdbConfig {
    pub api_key: String,
    pub base_url: String,
    pub language: String,
    pub fallback_language: String,
    pub timeout_secs: u64,
}

impl From<&ResolverConfig> for SanitizedConfig {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            tmdb: SanitizedTmdbConfig {
                api_key: mask_secret(&config.tmdb.api_key),
                base_url: config.tmdb.base_url.clone(),
                language: config.tmdb.language.clone(),
                fallback_language: config.tmdb.fallback_language.clone(),
                timeout_secs: config.tmdb.timeout_secs,
            },
            retry: config.retry.clone(),
            rate_limit: config.rate_limit.clone(),
            matching: config.matching.clone(),
            pool: config.pool.clone(),
            cache: config.cache.clone(),
        }
    }
}
