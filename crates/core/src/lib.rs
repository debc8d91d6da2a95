pub mod cache;
pub mod catalog;
pub mod config;
pub mod limiter;
pub mod metrics;
pub mod monitor;
pub mod pool;
pub mod resolver;
pub mod scoring;
pub mod testing;

pub use cache::{CacheStats, LruMap};
pub use catalog::{
    BlockingCatalogClient, BlockingTmdbClient, CandidateResult, CatalogClient, CatalogError,
    DetailRecord, MediaType, SearchQuery, TmdbClient,
};
pub use config::{
    load_config, load_config_from_str, mask_secret, validate_config, ConfigError, PoolMode,
    ResolverConfig, SanitizedConfig,
};
pub use limiter::{ErrorClass, RateLimiter, RetryStats};
pub use monitor::{OperationSample, OperationSummary, PerformanceMonitor};
pub use pool::{
    AsyncClientPool, BoundedClientPool, ClientPool, PoolError, PoolHealth, PoolStatistics,
    ThreadLocalClientPool,
};
pub use resolver::{
    BlockingMetadataResolver, MetadataResolver, Resolution, ResolveError, ResolvedMatch,
    StrategyKind,
};
pub use scoring::QualityScorer;
