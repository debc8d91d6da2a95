//! Request counters kept by each client.

use serde::Serialize;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated on every outbound attempt.
#[derive(Debug, Default)]
pub struct RequestCounters {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    rate_limited: AtomicU64,
}

impl RequestCounters {
    pub fn record_attempt(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RetryStats {
        RetryStats {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.succeeded.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            retried_requests: self.retried.load(Ordering::Relaxed),
            rate_limited_requests: self.rate_limited.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RequestCounters`].
///
/// `total_requests` counts network attempts, so one call retried twice adds 3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retried_requests: u64,
    pub rate_limited_requests: u64,
}

impl Add for RetryStats {
    type Output = RetryStats;

    fn add(self, other: RetryStats) -> RetryStats {
        RetryStats {
            total_requests: self.total_requests + other.total_requests,
            successful_requests: self.successful_requests + other.successful_requests,
            failed_requests: self.failed_requests + other.failed_requests,
            retried_requests: self.retried_requests + other.retried_requests,
            rate_limited_requests: self.rate_limited_requests + other.rate_limited_requests,
        }
    }
}
