//! Prometheus metrics for the resolver.
//!
//! This module provides metrics for:
//! - Catalog calls (requests by outcome, retries by error class)
//! - Response cache lookups
//! - Resolution outcomes and match confidence
//! - Pool acquisition waits and monitored operation durations
//!
//! Nothing is registered globally; hosts call [`register_all`] on their own
//! registry or collect [`all_metrics`] themselves.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

// =============================================================================
// Catalog
// =============================================================================

/// Catalog requests by operation and outcome.
pub static CATALOG_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "metaresolve_catalog_requests_total",
            "Catalog requests by operation and outcome",
        ),
        &["operation", "status"], // status: "ok" or an error class
    )
    .expect("valid catalog request metric")
});

/// Retries scheduled, by error class.
pub static CATALOG_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("metaresolve_catalog_retries_total", "Catalog retries by error class"),
        &["class"],
    )
    .expect("valid catalog retry metric")
});

/// Cache lookups by result.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("metaresolve_cache_lookups_total", "Response cache lookups"),
        &["result"], // "hit", "miss"
    )
    .expect("valid cache lookup metric")
});

// =============================================================================
// Resolution
// =============================================================================

/// Finished resolutions by outcome and deciding strategy.
pub static RESOLVE_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("metaresolve_resolve_outcomes_total", "Resolution outcomes"),
        &["outcome", "strategy"], // outcome: "matched", "needs_selection", "not_found"
    )
    .expect("valid resolve outcome metric")
});

/// Best candidate score per found resolution.
pub static MATCH_CONFIDENCE: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "metaresolve_match_confidence",
            "Distribution of best match confidence scores",
        )
        .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 0.95, 1.0]),
    )
    .expect("valid match confidence metric")
});

// =============================================================================
// Pool & monitor
// =============================================================================

/// Time spent waiting for a pooled client under contention.
pub static POOL_ACQUIRE_WAIT: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "metaresolve_pool_acquire_wait_seconds",
            "Time waiting for a pooled client",
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .expect("valid pool wait metric")
});

/// Duration of operations wrapped by the performance monitor.
pub static OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "metaresolve_operation_duration_seconds",
            "Duration of monitored operations",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["name"],
    )
    .expect("valid operation duration metric")
});

/// Every metric in this module.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Catalog
        Box::new(CATALOG_REQUESTS.clone()),
        Box::new(CATALOG_RETRIES.clone()),
        Box::new(CACHE_LOOKUPS.clone()),
        // Resolution
        Box::new(RESOLVE_OUTCOMES.clone()),
        Box::new(MATCH_CONFIDENCE.clone()),
        // Pool & monitor
        Box::new(POOL_ACQUIRE_WAIT.clone()),
        Box::new(OPERATION_DURATION.clone()),
    ]
}

/// Register every metric with `registry`.
pub fn register_all(registry: &Registry) -> Result<(), prometheus::Error> {
    for metric in all_metrics() {
        registry.register(metric)?;
    }
    Ok(())
}
