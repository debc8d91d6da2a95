//! Thread-based TMDB client.
//!
//! Same behaviour as [`super::TmdbClient`], but every wait parks the calling
//! thread. A backoff sleep cannot be interrupted once started.

use std::sync::Arc;

use tracing::debug;

use super::client_core::{ClientContext, ClientCore, ClientStats};
use super::transport::{BlockingHttpTransport, BlockingTransport, CatalogRequest};
use super::types::{CandidateResult, DetailRecord, MediaType, SearchRequest};
use super::{wire, BlockingCatalogClient, CatalogError, BLOCKING_RETRY_AFTER_FALLBACK};
use crate::limiter::{BlockingSemaphore, RetryDecision};
use crate::pool::Poolable;

/// TMDB client for blocking callers.
pub struct BlockingTmdbClient<T: BlockingTransport = BlockingHttpTransport> {
    core: ClientCore,
    transport: Arc<T>,
    in_flight: BlockingSemaphore,
}

impl BlockingTmdbClient<BlockingHttpTransport> {
    pub fn connect(ctx: &ClientContext) -> Result<Self, CatalogError> {
        let transport =
            BlockingHttpTransport::new(&ctx.config.tmdb.base_url, ctx.config.tmdb.timeout())?;
        Self::new(ctx, Arc::new(transport))
    }
}

impl<T: BlockingTransport> BlockingTmdbClient<T> {
    pub fn new(ctx: &ClientContext, transport: Arc<T>) -> Result<Self, CatalogError> {
        let core = ClientCore::new(ctx, BLOCKING_RETRY_AFTER_FALLBACK)?;
        let in_flight = BlockingSemaphore::new(core.config().rate_limit.max_concurrent);
        Ok(Self {
            core,
            transport,
            in_flight,
        })
    }

    pub fn clear_cache(&self) {
        self.core.clear_cache();
    }

    fn execute(
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
                std::thread::sleep(remaining);
            }
            self.core.limiter().acquire_blocking();

            let result = {
                let _permit = self.in_flight.acquire();
                self.core.ensure_open()?;
                self.core.record_attempt();
                self.transport.get(request)
            };

            match result.and_then(|response| self.core.interpret(response)) {
                Ok(body) => {
                    self.core.on_success(operation);
                    return Ok(body);
                }
                Err(err) => match self.core.on_failure(operation, attempt, err) {
                    RetryDecision::Retry(delay) => {
                        std::thread::sleep(delay);
                        attempt += 1;
                    }
                    RetryDecision::GiveUp(err) => return Err(err),
                },
            }
        }
    }
}

impl<T: BlockingTransport + 'static> Poolable for BlockingTmdbClient<T> {
    fn close(&self) {
        self.core.close();
    }
}

impl<T: BlockingTransport + 'static> BlockingCatalogClient for BlockingTmdbClient<T> {
    fn search(&self, request: &SearchRequest) -> Result<Vec<CandidateResult>, CatalogError> {
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

        let body = self.execute("search", &self.core.search_request(request))?;
        let results = wire::parse_search(&body, request.media)?;
        debug!(query = %request.query, year = ?request.year, count = results.len(), "Search complete");

        self.core.store_search(key, &results);
        Ok(results)
    }

    fn details(
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

        let body = self.execute("details", &self.core.details_request(id, media_type, language))?;
        let record = wire::parse_details(&body, media_type, language)?;

        self.core.store_details(key, &record);
        Ok(Some(record))
    }

    fn stats(&self) -> Arc<ClientStats> {
        self.core.stats()
    }
}
