//! Cooperative resolver: clients come from an async pool and every wait
//! suspends the calling task.

use std::sync::Arc;

use tracing::{debug, info};

use super::fallback::FallbackSearch;
use super::strategy::{effective_year, plan_strategies};
use super::{record_outcome, Resolution, ResolveError};
use crate::cache::CacheStats;
use crate::catalog::{
    CatalogClient, ClientContext, DetailRecord, HttpTransport, MediaType, SearchQuery, TmdbClient,
    Transport,
};
use crate::config::{validate_config, ResolverConfig, SanitizedConfig};
use crate::limiter::RetryStats;
use crate::monitor::PerformanceMonitor;
use crate::pool::{AsyncClientPool, ClientFactory, PoolHealth, PoolObserver, PoolStatistics};
use crate::scoring::QualityScorer;

/// Entry point for async callers. Build one per session and share it.
pub struct MetadataResolver<T: Transport + 'static = HttpTransport> {
    config: Arc<ResolverConfig>,
    ctx: ClientContext,
    pool: Arc<AsyncClientPool<TmdbClient<T>>>,
    scorer: QualityScorer,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl MetadataResolver<HttpTransport> {
    /// Validate `config` and warm the pool with HTTPS clients.
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        let transport = HttpTransport::new(&config.tmdb.base_url, config.tmdb.timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }
}

impl<T: Transport + 'static> MetadataResolver<T> {
    /// Every pooled client sends through `transport`; each keeps its own
    /// cache and rate limiter.
    pub fn with_transport(config: ResolverConfig, transport: Arc<T>) -> Result<Self, ResolveError> {
        validate_config(&config)?;
        let config = Arc::new(config);
        let ctx = ClientContext::new(Arc::clone(&config));

        let factory: ClientFactory<TmdbClient<T>> = {
            let ctx = ctx.clone();
            Arc::new(move || TmdbClient::new(&ctx, Arc::clone(&transport)))
        };
        let pool = AsyncClientPool::new(
            factory,
            config.pool.initial_size,
            config.pool.max_size,
            config.pool.acquire_timeout(),
        )?;

        info!(config = ?SanitizedConfig::from(config.as_ref()), "Metadata resolver ready");

        Ok(Self {
            scorer: QualityScorer::from_config(&config.matching),
            pool: Arc::new(pool),
            monitor: None,
            ctx,
            config,
        })
    }

    /// Record every resolve and detail lookup in `monitor`.
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

    /// Resolve a raw title. `language` defaults to the configured one.
    pub async fn resolve(
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

        match &self.monitor {
            Some(monitor) => monitor.measure_async("resolve", self.run(&query)).await,
            None => self.run(&query).await,
        }
    }

    async fn run(&self, query: &SearchQuery) -> Result<Resolution, ResolveError> {
        let normalizer = self.scorer.normalizer();
        let plan = plan_strategies(query, normalizer, &self.config.matching);
        let year = effective_year(query, normalizer);
        debug!(query = %query.text, ?year, strategies = plan.len(), "Resolving title");

        let client = self.pool.acquire(None).await?;
        let mut search = FallbackSearch::new(&self.scorer, &self.config.matching, &query.language, year);
        for strategy in &plan {
            let results = client.search(&strategy.request(&query.language)).await?;
            if let Some(resolution) = search.evaluate(strategy, results) {
                record_outcome(&query.text, &resolution);
                return Ok(resolution);
            }
        }
        drop(client);

        let resolution = search.finish();
        record_outcome(&query.text, &resolution);
        Ok(resolution)
    }

    /// Full record for one entry. When the overview is empty in `language`,
    /// the configured fallback language is tried once.
    pub async fn fetch_details(
        &self,
        id: u64,
        media_type: MediaType,
        language: Option<&str>,
    ) -> Result<Option<DetailRecord>, ResolveError> {
        let language = language.unwrap_or(&self.config.tmdb.language);
        match &self.monitor {
            Some(monitor) => {
                monitor
                    .measure_async("fetch_details", self.lookup_details(id, media_type, language))
                    .await
            }
            None => self.lookup_details(id, media_type, language).await,
        }
    }

    async fn lookup_details(
        &self,
        id: u64,
        media_type: MediaType,
        language: &str,
    ) -> Result<Option<DetailRecord>, ResolveError> {
        let client = self.pool.acquire(None).await?;
        let record = client.details(id, media_type, language).await?;

        let fallback = self.config.tmdb.fallback_language.as_str();
        match record {
            Some(record)
                if record.overview.trim().is_empty() && !fallback.eq_ignore_ascii_case(language) =>
            {
                debug!(id, %media_type, language, fallback, "Overview empty, trying fallback language");
                match client.details(id, media_type, fallback).await? {
                    Some(translated) if !translated.overview.trim().is_empty() => Ok(Some(translated)),
                    _ => Ok(Some(record)),
                }
            }
            other => Ok(other),
        }
    }

    /// Serve only cached data; misses come back empty instead of calling out.
    pub fn set_cache_only_mode(&self, enabled: bool) {
        self.ctx.cache_only.set(enabled);
        info!(enabled, "Cache-only mode changed");
    }

    pub fn is_cache_only(&self) -> bool {
        self.ctx.cache_only.is_enabled()
    }

    /// Summed over every client of this session.
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

    /// Drop cached responses of idle clients and the scorer's memo.
    pub fn clear_caches(&self) {
        self.pool.for_each_idle(|client| client.clear_cache());
        self.scorer.normalizer().clear();
        debug!("Caches cleared");
    }

    /// Close the pool; later calls fail with a pool error.
    pub fn close(&self) {
        self.pool.close();
        info!("Metadata resolver closed");
    }

    pub fn pool_observer(&self) -> Arc<dyn PoolObserver> {
        Arc::clone(&self.pool) as Arc<dyn PoolObserver>
    }
}
