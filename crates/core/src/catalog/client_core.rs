//! State and decisions shared by the blocking and cooperative clients.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::transport::{CatalogRequest, TransportResponse};
use super::types::{CandidateResult, DetailRecord, MediaType, SearchRequest};
use super::CatalogError;
use crate::cache::{CacheCounters, CacheKey, CacheOnlySwitch, CacheStats, CachedPayload, ResponseCache};
use crate::config::{mask_secret, ResolverConfig};
use crate::limiter::{RateLimiter, RequestCounters, RetryDecision, RetryPolicy, RetryStats};
use crate::metrics;

/// Counters owned by one client. They outlive the client so session totals
/// survive pool shrinking.
#[derive(Debug, Default)]
pub struct ClientStats {
    requests: RequestCounters,
    cache: Arc<CacheCounters>,
    closed: AtomicBool,
}

impl ClientStats {
    pub fn retry_stats(&self) -> RetryStats {
        self.requests.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Session-wide aggregation of client stats.
///
/// Live clients are summed on demand; a client's counters are folded into
/// the retired totals when it closes, so the registry stays as large as the
/// set of open clients.
#[derive(Debug, Clone, Default)]
pub struct StatsRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    live: Vec<Arc<ClientStats>>,
    retired_requests: RetryStats,
    retired_cache: CacheStats,
}

impl StatsRegistry {
    pub fn register(&self, stats: Arc<ClientStats>) {
        self.inner.lock().live.push(stats);
    }

    /// Move a closed client's counters into the retired totals.
    ///
    /// Counts recorded by that client after this call are not aggregated.
    pub fn retire(&self, stats: &Arc<ClientStats>) {
        let mut state = self.inner.lock();
        let Some(index) = state.live.iter().position(|s| Arc::ptr_eq(s, stats)) else {
            return;
        };
        let retired = state.live.swap_remove(index);

        let requests = retired.retry_stats();
        let mut cache = retired.cache_stats();
        cache.entries = 0;
        state.retired_requests = state.retired_requests + requests;
        state.retired_cache = state.retired_cache + cache;
    }

    /// Request counters summed over all clients ever created.
    pub fn retry_stats(&self) -> RetryStats {
        let state = self.inner.lock();
        state
            .live
            .iter()
            .fold(state.retired_requests, |acc, s| acc + s.retry_stats())
    }

    /// Cache counters summed over all clients; entries only count live ones.
    pub fn cache_stats(&self) -> CacheStats {
        let state = self.inner.lock();
        state
            .live
            .iter()
            .fold(state.retired_cache, |acc, s| acc + s.cache_stats())
    }

    /// Clients registered and not yet closed.
    pub fn client_count(&self) -> usize {
        self.inner.lock().live.len()
    }
}

/// Everything a client needs at construction, shared across a pool.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub config: Arc<ResolverConfig>,
    pub cache_only: CacheOnlySwitch,
    pub registry: StatsRegistry,
}

impl ClientContext {
    pub fn new(config: Arc<ResolverConfig>) -> Self {
        let cache_only = CacheOnlySwitch::new(config.cache.cache_only);
        Self {
            config,
            cache_only,
            registry: StatsRegistry::default(),
        }
    }
}

/// Cache, limiter, retry policy and response handling for one client.
///
/// Holds no transport; the owning client drives the calls and only decides
/// how to wait.
#[derive(Debug)]
pub(crate) struct ClientCore {
    config: Arc<ResolverConfig>,
    cache: ResponseCache,
    limiter: RateLimiter,
    policy: RetryPolicy,
    stats: Arc<ClientStats>,
    registry: StatsRegistry,
    cache_only: CacheOnlySwitch,
    closed: AtomicBool,
}

impl ClientCore {
    pub(crate) fn new(
        ctx: &ClientContext,
        default_retry_after: Duration,
    ) -> Result<Self, CatalogError> {
        let config = Arc::clone(&ctx.config);
        if config.tmdb.api_key.trim().is_empty() {
            return Err(CatalogError::NotConfigured(
                "TMDB API key is required".to_string(),
            ));
        }

        let stats = Arc::new(ClientStats::default());
        ctx.registry.register(Arc::clone(&stats));

        debug!(
            api_key = %mask_secret(&config.tmdb.api_key),
            burst_limit = config.rate_limit.burst_limit,
            window_ms = config.rate_limit.window_ms,
            "Creating catalog client"
        );

        Ok(Self {
            cache: ResponseCache::new(config.cache.max_size, Arc::clone(&stats.cache)),
            limiter: RateLimiter::new(config.rate_limit.burst_limit, config.rate_limit.window()),
            policy: RetryPolicy::from_config(&config.retry, default_retry_after),
            stats,
            registry: ctx.registry.clone(),
            cache_only: ctx.cache_only.clone(),
            closed: AtomicBool::new(false),
            config,
        })
    }

    pub(crate) fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub(crate) fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub(crate) fn stats(&self) -> Arc<ClientStats> {
        Arc::clone(&self.stats)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), CatalogError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(CatalogError::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cache.clear();
            self.stats.closed.store(true, Ordering::SeqCst);
            self.registry.retire(&self.stats);
            debug!("Catalog client closed");
        }
    }

    pub(crate) fn is_cache_only(&self) -> bool {
        self.cache_only.is_enabled()
    }

    pub(crate) fn clear_cache(&self) {
        self.cache.clear();
    }

    pub(crate) fn search_key(&self, request: &SearchRequest) -> CacheKey {
        CacheKey::new("search", request.cache_args(), &request.language)
    }

    pub(crate) fn details_key(&self, id: u64, media_type: MediaType, language: &str) -> CacheKey {
        CacheKey::new("details", format!("{}|{}", media_type, id), language)
    }

    pub(crate) fn cached_search(&self, key: &CacheKey) -> Option<Vec<CandidateResult>> {
        match self.cache.get(key) {
            Some(CachedPayload::Search(results)) => Some(results.as_ref().clone()),
            _ => None,
        }
    }

    pub(crate) fn cached_details(&self, key: &CacheKey) -> Option<DetailRecord> {
        match self.cache.get(key) {
            Some(CachedPayload::Details(record)) => Some(record.as_ref().clone()),
            _ => None,
        }
    }

    pub(crate) fn store_search(&self, key: CacheKey, results: &[CandidateResult]) {
        self.cache
            .insert(key, CachedPayload::Search(Arc::new(results.to_vec())));
    }

    pub(crate) fn store_details(&self, key: CacheKey, record: &DetailRecord) {
        self.cache
            .insert(key, CachedPayload::Details(Arc::new(record.clone())));
    }

    /// `/search/{multi|tv|movie}`, first page only.
    pub(crate) fn search_request(&self, request: &SearchRequest) -> CatalogRequest {
        let endpoint = request.media.map(|m| m.as_str()).unwrap_or("multi");
        let mut call = CatalogRequest::new(format!("/search/{}", endpoint))
            .param("api_key", self.config.tmdb.api_key.as_str())
            .param("language", request.language.as_str())
            .param("query", request.query.trim())
            .param("page", "1")
            .param("include_adult", "false");

        if let Some(year) = request.year {
            // TMDB names the year filter differently per endpoint.
            let key = match request.media {
                Some(MediaType::Tv) => "first_air_date_year",
                Some(MediaType::Movie) => "primary_release_year",
                None => "year",
            };
            call = call.param(key, year.to_string());
        }
        call
    }

    pub(crate) fn details_request(
        &self,
        id: u64,
        media_type: MediaType,
        language: &str,
    ) -> CatalogRequest {
        CatalogRequest::new(format!("/{}/{}", media_type, id))
            .param("api_key", self.config.tmdb.api_key.as_str())
            .param("language", language)
            .param("append_to_response", "translations,alternative_titles")
    }

    /// How long a new call must wait for the 429 cooldown, if at all.
    pub(crate) fn cooldown_gate(&self) -> Result<Option<Duration>, CatalogError> {
        match self.limiter.cooldown_remaining() {
            Some(remaining) if self.policy.fail_fast_on_cooldown => {
                Err(CatalogError::CoolingDown { remaining })
            }
            other => Ok(other),
        }
    }

    pub(crate) fn record_attempt(&self) {
        self.stats.requests.record_attempt();
    }

    /// Classify a raw response, yielding the body for 2xx.
    pub(crate) fn interpret(&self, response: TransportResponse) -> Result<String, CatalogError> {
        match response.status {
            200..=299 => Ok(response.body),
            429 => Err(CatalogError::RateLimited {
                retry_after: response.retry_after,
            }),
            status @ 500..=599 => Err(CatalogError::ServerError {
                status,
                message: status_message(&response.body),
            }),
            status => Err(CatalogError::ClientError {
                status,
                message: status_message(&response.body),
            }),
        }
    }

    pub(crate) fn on_success(&self, operation: &'static str) {
        self.stats.requests.record_success();
        metrics::CATALOG_REQUESTS
            .with_label_values(&[operation, "ok"])
            .inc();
    }

    /// Update counters and cooldown for a failed attempt and decide what next.
    pub(crate) fn on_failure(
        &self,
        operation: &'static str,
        attempt: u32,
        error: CatalogError,
    ) -> RetryDecision {
        let class = error.class();
        metrics::CATALOG_REQUESTS
            .with_label_values(&[operation, class.as_str()])
            .inc();

        if let CatalogError::RateLimited { retry_after } = &error {
            let cooldown = self.policy.cooldown_for(*retry_after);
            self.limiter.enter_cooldown(cooldown);
            self.stats.requests.record_rate_limited();
            warn!(
                operation,
                cooldown_ms = cooldown.as_millis() as u64,
                "Catalog rate limit hit, cooling down"
            );
        }

        let decision = self.policy.decide(attempt, error);
        match &decision {
            RetryDecision::Retry(delay) => {
                self.stats.requests.record_retry();
                metrics::CATALOG_RETRIES
                    .with_label_values(&[class.as_str()])
                    .inc();
                debug!(
                    operation,
                    attempt,
                    class = class.as_str(),
                    delay_ms = delay.as_millis() as u64,
                    "Retrying catalog call"
                );
            }
            RetryDecision::GiveUp(err) => {
                self.stats.requests.record_failure();
                warn!(operation, attempt, error = %err, "Catalog call failed");
            }
        }
        decision
    }
}

impl Drop for ClientCore {
    fn drop(&mut self) {
        self.close();
    }
}

/// TMDB error bodies carry `status_message`; fall back to the raw body.
fn status_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        status_message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.status_message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    fn core() -> ClientCore {
        let ctx = ClientContext::new(Arc::new(fixtures::config()));
        ClientCore::new(&ctx, Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let ctx = ClientContext::new(Arc::new(ResolverConfig::with_api_key("  ")));
        let err = ClientCore::new(&ctx, Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, CatalogError::NotConfigured(_)));
        assert_eq!(ctx.registry.client_count(), 0);
    }

    #[test]
    fn test_interpret_classifies_statuses() {
        let core = core();
        assert_eq!(
            core.interpret(TransportResponse::ok("{}")).unwrap(),
            "{}"
        );

        let limited = TransportResponse {
            status: 429,
            retry_after: Some(Duration::from_secs(3)),
            body: String::new(),
        };
        assert!(matches!(
            core.interpret(limited),
            Err(CatalogError::RateLimited { retry_after: Some(d) }) if d == Duration::from_secs(3)
        ));

        let server = TransportResponse {
            status: 503,
            retry_after: None,
            body: r#"{"status_code":11,"status_message":"Internal error"}"#.to_string(),
        };
        match core.interpret(server) {
            Err(CatalogError::ServerError { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "Internal error");
            }
            other => panic!("Expected server error, got {:?}", other),
        }

        for status in [400, 401, 403, 404] {
            assert!(matches!(
                core.interpret(TransportResponse::status(status)),
                Err(CatalogError::ClientError { status: s, .. }) if s == status
            ));
        }
    }

    #[test]
    fn test_search_request_params() {
        let core = core();
        let request = core.search_request(&SearchRequest::new(" Frieren ", Some(2023), "ja-JP"));
        assert_eq!(request.path, "/search/multi");
        assert_eq!(request.param_value("query"), Some("Frieren"));
        assert_eq!(request.param_value("year"), Some("2023"));
        assert_eq!(request.param_value("language"), Some("ja-JP"));
        assert_eq!(request.param_value("page"), Some("1"));

        let tv = core.search_request(
            &SearchRequest::new("Frieren", Some(2023), "en-US").with_media(MediaType::Tv),
        );
        assert_eq!(tv.path, "/search/tv");
        assert_eq!(tv.param_value("first_air_date_year"), Some("2023"));
        assert_eq!(tv.param_value("year"), None);
    }

    #[test]
    fn test_details_request_appends_translations() {
        let request = core().details_request(1429, MediaType::Tv, "en-US");
        assert_eq!(request.path, "/tv/1429");
        assert_eq!(
            request.param_value("append_to_response"),
            Some("translations,alternative_titles")
        );
    }

    #[test]
    fn test_rate_limited_failure_enters_cooldown() {
        let core = core();
        let decision = core.on_failure(
            "search",
            0,
            CatalogError::RateLimited {
                retry_after: Some(Duration::from_secs(30)),
            },
        );
        assert!(matches!(decision, RetryDecision::Retry(d) if d >= Duration::from_secs(30)));
        assert!(core.limiter().cooldown_remaining().is_some());

        let stats = core.stats().retry_stats();
        assert_eq!(stats.rate_limited_requests, 1);
        assert_eq!(stats.retried_requests, 1);
    }

    #[test]
    fn test_cooldown_gate_fail_fast() {
        let mut config = fixtures::config();
        config.retry.fail_fast_on_cooldown = true;
        let ctx = ClientContext::new(Arc::new(config));
        let core = ClientCore::new(&ctx, Duration::from_secs(10)).unwrap();

        assert!(core.cooldown_gate().unwrap().is_none());
        core.limiter().enter_cooldown(Duration::from_secs(5));
        assert!(matches!(
            core.cooldown_gate(),
            Err(CatalogError::CoolingDown { .. })
        ));
    }

    #[test]
    fn test_close_marks_stats_and_clears_cache() {
        let ctx = ClientContext::new(Arc::new(fixtures::config()));
        let core = ClientCore::new(&ctx, Duration::from_secs(10)).unwrap();
        let key = core.search_key(&SearchRequest::new("Frieren", None, "en-US"));
        core.store_search(key, &[fixtures::tv_candidate(1, "Frieren", Some(2023))]);
        assert_eq!(ctx.registry.cache_stats().entries, 1);

        core.close();
        assert!(matches!(core.ensure_open(), Err(CatalogError::Closed)));
        assert_eq!(ctx.registry.cache_stats().entries, 0);
    }

    #[test]
    fn test_closed_clients_leave_registry_but_keep_totals() {
        let ctx = ClientContext::new(Arc::new(fixtures::config()));
        let kept = ClientCore::new(&ctx, Duration::from_secs(10)).unwrap();
        kept.record_attempt();

        for round in 0..50 {
            let core = ClientCore::new(&ctx, Duration::from_secs(10)).unwrap();
            core.record_attempt();
            core.on_success("search");
            let key = core.search_key(&SearchRequest::new(format!("Title {}", round), None, "en-US"));
            core.store_search(key.clone(), &[]);
            assert!(core.cached_search(&key).is_some());
            core.close();
            assert_eq!(ctx.registry.client_count(), 1);
        }

        let retry = ctx.registry.retry_stats();
        assert_eq!(retry.total_requests, 51);
        assert_eq!(retry.successful_requests, 50);
        let cache = ctx.registry.cache_stats();
        assert_eq!(cache.hits, 50);
        assert_eq!(cache.entries, 0);

        // Closing twice retires once.
        kept.close();
        kept.close();
        assert_eq!(ctx.registry.client_count(), 0);
        assert_eq!(ctx.registry.retry_stats().total_requests, 51);
    }

    #[test]
    fn test_dropped_client_is_retired() {
        let ctx = ClientContext::new(Arc::new(fixtures::config()));
        let core = ClientCore::new(&ctx, Duration::from_secs(10)).unwrap();
        core.record_attempt();
        drop(core);

        assert_eq!(ctx.registry.client_count(), 0);
        assert_eq!(ctx.registry.retry_stats().total_requests, 1);
    }
}
