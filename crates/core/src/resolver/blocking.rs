//! Thread-based resolver over a [`BlockingPool`].

use std::sync::Arc;

use tracing::{debug, info};

use super::fallback::FallbackSearch;
use super::strategy::{effective_year, plan_strategies};
use super::{record_outcome, Resolution, ResolveError};
use crate::cache::CacheStats;
use crate::catalog::{
    BlockingCatalogClient, BlockingHttpTransport, BlockingTmdbClient, BlockingTransport,
    ClientContext, DetailRecord, MediaType, SearchQuery,
};
use crate::config::{validate_config, ResolverConfig, SanitizedConfig};
use crate::limiter::RetryStats;
use crate::monitor::PerformanceMonitor;
use crate::pool::{BlockingPool, ClientFactory, ClientPool, PoolHealth, PoolObserver, PoolStatistics};
use crate::scoring::QualityScorer;

type Client<T> = BlockingTmdbClient<T>;

/// Entry point for callers on plain threads. `pool.mode` picks between a
/// shared bounded pool and one client per thread.
pub struct BlockingMetadataResolver<T: BlockingTransport + 'static = BlockingHttpTransport> {
    config: Arc<ResolverConfig>,
    ctx: ClientContext,
    pool: Arc<BlockingPool<Client<T>>>,
    scorer: QualityScorer,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl BlockingMetadataResolver<BlockingHttpTransport> {
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        let transport =
            BlockingHttpTransport::new(&config.tmdb.base_url, config.tmdb.timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }
}

impl<T: BlockingTransport + 'static> BlockingMetadataResolver<T> {
    pub fn with_transport(config: ResolverConfig, transport: Arc<T>) -> Result<Self, ResolveError> {
        validate_config(&config)?;
        let config = Arc::new(config);
        let ctx = ClientContext::new(Arc::clone(&config));

        let factory: ClientFactory<Client<T>> = {
            let ctx = ctx.clone();
            Arc::new(move || BlockingTmdbClient::new(&ctx, Arc::clone(&transport)))
        };
        let pool = BlockingPool::from_config(&config.pool, factory)?;

        info!(
            mode = ?config.pool.mode,
            config = ?SanitizedConfig::from(config.as_ref()),
            "Blocking metadata resolver ready"
        );

        Ok(Self {
            scorer: QualityScorer::from_config(&config.matching),
            pool: Arc::new(pool),
            monitor: None,
            ctx,
            config,
        })
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        monitor.attach_pool(self.pool_observer());
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(self.config.as_ref())
    }

    /// Resolve a raw title, parking the calling thread on every wait.
    pub fn resolve(
        &self,
        text: &str,
        year_hint: Option<i32>,
        language: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let language = language.unwrap_or(&self.config.tmdb.language);
        let query = SearchQuery::new(text.trim(), year_hint, language);
        if query.text.is_empty() {
            return Err(ResolveError::EmptyQuery);
        }

        self.observe("resolve", || self.pool.with_client(|client| self.run(client, &query))?)
    }

    fn run(&self, client: &Client<T>, query: &SearchQuery) -> Result<Resolution, ResolveError> {
        let normalizer = self.scorer.normalizer();
        let plan = plan_strategies(query, normalizer, &self.config.matching);
        let year = effective_year(query, normalizer);
        debug!(query = %query.text, ?year, strategies = plan.len(), "Resolving title");

        let mut search = FallbackSearch::new(&self.scorer, &self.config.matching, &query.language, year);
        for strategy in &plan {
            let results = client.search(&strategy.request(&query.language))?;
            if let Some(resolution) = search.evaluate(strategy, results) {
                record_outcome(&query.text, &resolution);
                return Ok(resolution);
            }
        }

        let resolution = search.finish();
        record_outcome(&query.text, &resolution);
        Ok(resolution)
    }

    /// Same fallback-language rule as the async resolver.
    pub fn fetch_details(
        &self,
        id: u64,
        media_type: MediaType,
        language: Option<&str>,
    ) -> Result<Option<DetailRecord>, ResolveError> {
        let language = language.unwrap_or(&self.config.tmdb.language);
        let fallback = self.config.tmdb.fallback_language.as_str();

        self.observe("fetch_details", || {
            self.pool.with_client(|client| -> Result<Option<DetailRecord>, ResolveError> {
                let record = client.details(id, media_type, language)?;
                match record {
                    Some(record)
                        if record.overview.trim().is_empty()
                            && !fallback.eq_ignore_ascii_case(language) =>
                    {
                        debug!(id, %media_type, language, fallback, "Overview empty, trying fallback language");
                        Ok(match client.details(id, media_type, fallback)? {
                            Some(translated) if !translated.overview.trim().is_empty() => {
                                Some(translated)
                            }
                            _ => Some(record),
                        })
                    }
                    other => Ok(other),
                }
            })?
        })
    }

    fn observe<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        match &self.monitor {
            Some(monitor) => monitor.measure(name, f),
            None => f(),
        }
    }

    pub fn set_cache_only_mode(&self, enabled: bool) {
        self.ctx.cache_only.set(enabled);
        info!(enabled, "Cache-only mode changed");
    }

    pub fn is_cache_only(&self) -> bool {
        self.ctx.cache_only.is_enabled()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.ctx.registry.cache_stats()
    }

    pub fn retry_stats(&self) -> RetryStats {
        self.ctx.registry.retry_stats()
    }

    pub fn pool_stats(&self) -> PoolStatistics {
        self.pool.stats()
    }

    pub fn health_check(&self) -> PoolHealth {
        self.pool.health_check()
    }

    /// Drop cached responses of clients not currently in use and the
    /// scorer's memo.
    pub fn clear_caches(&self) {
        self.pool.for_each_idle(&|client| client.clear_cache());
        self.scorer.normalizer().clear();
        debug!("Caches cleared");
    }

    pub fn close(&self) {
        self.pool.close();
        info!("Blocking metadata resolver closed");
    }

    pub fn pool_observer(&self) -> Arc<dyn PoolObserver> {
        Arc::clone(&self.pool) as Arc<dyn PoolObserver>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TransportResponse;
    use crate::config::PoolMode;
    use crate::testing::{fixtures, MockTransport};

    fn frieren_body() -> String {
        fixtures::search_body(&[fixtures::tv_json(209867, "Frieren", "2023-09-29")])
    }

    #[test]
    fn test_blocking_resolve_and_cache() {
        let transport = Arc::new(MockTransport::new());
        transport.respond("/search", TransportResponse::ok(frieren_body()));
        let resolver =
            BlockingMetadataResolver::with_transport(fixtures::config(), Arc::clone(&transport))
                .unwrap();

        let first = resolver.resolve("Frieren", Some(2023), None).unwrap();
        let found = first.found().unwrap();
        assert_eq!(found.candidates[0].id, 209867);
        assert!(!found.needs_selection);

        let calls = transport.call_count();
        resolver.resolve("Frieren", Some(2023), None).unwrap();
        assert_eq!(transport.call_count(), calls);
        assert!(resolver.cache_stats().hits >= 1);
    }

    #[test]
    fn test_thread_local_mode_one_client_per_thread() {
        let mut config = fixtures::config();
        config.pool.mode = PoolMode::ThreadLocal;
        let transport = Arc::new(MockTransport::new());
        transport.respond("/search", TransportResponse::ok(frieren_body()));
        let resolver = Arc::new(
            BlockingMetadataResolver::with_transport(config, Arc::clone(&transport)).unwrap(),
        );

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                std::thread::spawn(move || resolver.resolve("Frieren", Some(2023), None).unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_found());
        }

        assert_eq!(resolver.pool_stats().clients_created, 3);
        // Each thread has its own cache, so each searched once.
        assert_eq!(transport.call_count(), 3);
    }

    #[test]
    fn test_thread_local_clients_end_with_their_threads() {
        let mut config = fixtures::config();
        config.pool.mode = PoolMode::ThreadLocal;
        let transport = Arc::new(MockTransport::new());
        transport.respond("/search", TransportResponse::ok(frieren_body()));
        let resolver = Arc::new(
            BlockingMetadataResolver::with_transport(config, Arc::clone(&transport)).unwrap(),
        );

        for _ in 0..20 {
            let worker = Arc::clone(&resolver);
            std::thread::spawn(move || worker.resolve("Frieren", Some(2023), None).unwrap())
                .join()
                .unwrap();
        }

        let stats = resolver.pool_stats();
        assert_eq!(stats.clients_created, 20);
        assert_eq!(stats.clients_destroyed, 20);
        assert_eq!(stats.active_clients + stats.idle_clients, 0);
        assert_eq!(resolver.ctx.registry.client_count(), 0);
        assert_eq!(
            resolver.retry_stats().total_requests,
            transport.call_count() as u64
        );
    }

    #[test]
    fn test_cache_only_mode_returns_not_found_without_network() {
        let transport = Arc::new(MockTransport::new());
        let resolver =
            BlockingMetadataResolver::with_transport(fixtures::config(), Arc::clone(&transport))
                .unwrap();
        resolver.set_cache_only_mode(true);

        let resolution = resolver.resolve("Frieren", Some(2023), None).unwrap();
        assert!(!resolution.is_found());
        assert_eq!(transport.call_count(), 0);
        assert!(resolver
            .fetch_details(209867, MediaType::Tv, None)
            .unwrap()
            .is_none());
    }
}
