//! Cooperative TMDB client.
//!
//! Waiting (tokens, in-flight slots, backoff) suspends the task; dropping the
//! future at any of those points abandons the call without side effects
//! beyond counters already recorded.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::debug;

use super::client_core::{ClientContext, ClientCore, ClientStats};
use super::transport::{CatalogRequest, HttpTransport, Transport};
use super::types::{CandidateResult, DetailRecord, MediaType, SearchRequest};
use super::{wire, CatalogClient, CatalogError, ASYNC_RETRY_AFTER_FALLBACK};
use crate::limiter::RetryDecision;
use crate::pool::Poolable;

/// TMDB client for async callers.
pub struct TmdbClient<T: Transport = HttpTransport> {
    core: ClientCore,
    transport: Arc<T>,
    in_flight: Semaphore,
}

impl TmdbClient<HttpTransport> {
    /// Client talking to the configured base URL over HTTPS.
    pub fn connect(ctx: &ClientContext) -> Result<Self, CatalogError> {
        let transport = HttpTransport::new(&ctx.config.tmdb.base_url, ctx.config.tmdb.timeout())?;
        Self::new(ctx, Arc::new(transport))
    }
}

impl<T: Transport> TmdbClient<T> {
    pub fn new(ctx: &ClientContext, transport: Arc<T>) -> Result<Self, CatalogError> {
        let core = ClientCore::new(ctx, ASYNC_RETRY_AFTER_FALLBACK)?;
        let in_flight = Semaphore::new(core.config().rate_limit.max_concurrent.max(1));
        Ok(Self {
            core,
            transport,
            in_flight,
        })
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.core.clear_cache();
    }

    /// Run one call with admission control and retries; returns the 2xx body.
    async fn execute(
        &self,
        operation: &'static str,
        request: &CatalogRequest,
    ) -> Result<String, CatalogError> {
        let mut attempt = 0;
        loop {
            if let Some(remaining) = self.core.cooldown_gate()? {
                debug!(
                    operation,
                    remaining_ms = remaining.as_millis() as u64,
                    "Waiting out rate limit cooldown"
                );
                tokio::time::sleep(remaining).await;
            }
            self.core.limiter().acquire().await;

            let result = {
                let _permit = self
                    .in_flight
                    .acquire()
                    .await
                    .map_err(|_| CatalogError::Closed)?;
                self.core.record_attempt();
                self.transport.get(request).await
            };

            match result.and_then(|response| self.core.interpret(response)) {
                Ok(body) => {
                    self.core.on_success(operation);
                    return Ok(body);
                }
                Err(err) => match self.core.on_failure(operation, attempt, err) {
                    RetryDecision::Retry(delay) => {
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp(err) => return Err(err),
                },
            }
        }
    }
}

impl<T: Transport + 'static> Poolable for TmdbClient<T> {
    fn close(&self) {
        self.core.close();
        self.in_flight.close();
    }
}

#[async_trait]
impl<T: Transport + 'static> CatalogClient for TmdbClient<T> {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<CandidateResult>, CatalogError> {
        self.core.ensure_open()?;

        let key = self.core.search_key(request);
        if let Some(results) = self.core.cached_search(&key) {
            debug!(query = %request.query, "Search served from cache");
            return Ok(results);
        }
        if self.core.is_cache_only() {
            debug!(query = %request.query, "Cache-only mode, skipping search");
            return Ok(Vec::new());
        }

        let body = self
            .execute("search", &self.core.search_request(request))
            .await?;
        let results = wire::parse_search(&body, request.media)?;
        debug!(query = %request.query, year = ?request.year, count = results.len(), "Search complete");

        self.core.store_search(key, &results);
        Ok(results)
    }

    async fn details(
        &self,
        id: u64,
        media_type: MediaType,
        language: &str,
    ) -> Result<Option<DetailRecord>, CatalogError> {
        self.core.ensure_open()?;

        let key = self.core.details_key(id, media_type, language);
        if let Some(record) = self.core.cached_details(&key) {
            return Ok(Some(record));
        }
        if self.core.is_cache_only() {
            debug!(id, %media_type, "Cache-only mode, skipping details");
            return Ok(None);
        }

        let body = self
            .execute("details", &self.core.details_request(id, media_type, language))
            .await?;
        let record = wire::parse_details(&body, media_type, language)?;

        self.core.store_details(key, &record);
        Ok(Some(record))
    }

    fn stats(&self) -> Arc<ClientStats> {
        self.core.stats()
    }
}
