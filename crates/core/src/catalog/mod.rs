//! Catalog service clients (TMDB v3).
//!
//! Two execution models share one capability:
//! - [`CatalogClient`]: cooperative, implemented by [`TmdbClient`].
//! - [`BlockingCatalogClient`]: thread-based, implemented by [`BlockingTmdbClient`].
//!
//! Both delegate caching, admission, response classification and the retry
//! decision to the same client core, so they only differ in how they wait.

mod blocking;
mod client_core;
mod tmdb;
mod transport;
mod types;
mod wire;

pub use blocking::BlockingTmdbClient;
pub use client_core::{ClientContext, ClientStats, StatsRegistry};
pub use tmdb::TmdbClient;
pub use transport::{
    BlockingHttpTransport, BlockingTransport, CatalogRequest, HttpTransport, Transport,
    TransportResponse,
};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::limiter::ErrorClass;
use crate::pool::Poolable;

/// Default cooldown after a 429 without `Retry-After`, thread-based client.
pub const BLOCKING_RETRY_AFTER_FALLBACK: Duration = Duration::from_secs(60);

/// Default cooldown after a 429 without `Retry-After`, cooperative client.
pub const ASYNC_RETRY_AFTER_FALLBACK: Duration = Duration::from_secs(10);

/// Errors that can occur when talking to the catalog service.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP 429.
    #[error("Rate limited by catalog service (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 5xx.
    #[error("Catalog server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    /// 4xx other than 429. Never retried.
    #[error("Catalog rejected request: {status} - {message}")]
    ClientError { status: u16, message: String },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<CatalogError>,
    },

    /// The client is inside a 429 cooldown and configured to fail fast.
    #[error("Client cooling down after rate limit, {remaining:?} left")]
    CoolingDown { remaining: Duration },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Missing or invalid credentials or settings.
    #[error("Client not configured: {0}")]
    NotConfigured(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Client is closed")]
    Closed,
}

impl CatalogError {
    /// Retry class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            CatalogError::RateLimited { .. } => ErrorClass::RateLimit,
            CatalogError::ServerError { .. } => ErrorClass::Server,
            CatalogError::Network(_) => ErrorClass::Network,
            CatalogError::Timeout => ErrorClass::Timeout,
            _ => ErrorClass::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

/// Cooperative catalog client capability.
#[async_trait]
pub trait CatalogClient: Poolable + Send + Sync {
    /// Search the first page of results.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<CandidateResult>, CatalogError>;

    /// Fetch full details. `Ok(None)` only in cache-only mode on a miss.
    async fn details(
        &self,
        id: u64,
        media_type: MediaType,
        language: &str,
    ) -> Result<Option<DetailRecord>, CatalogError>;

    /// Counters owned by this client.
    fn stats(&self) -> Arc<ClientStats>;
}

/// Thread-based catalog client capability.
pub trait BlockingCatalogClient: Poolable + Send + Sync {
    fn search(&self, request: &SearchRequest) -> Result<Vec<CandidateResult>, CatalogError>;

    fn details(
        &self,
        id: u64,
        media_type: MediaType,
        language: &str,
    ) -> Result<Option<DetailRecord>, CatalogError>;

    fn stats(&self) -> Arc<ClientStats>;
}
