//! Token bucket with per-token replenishment.

use std::collections::VecDeque;
use tokio::time::{Duration, Instant};

/// Rate limit status for a bucket.
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub burst_limit: u32,
    pub window: Duration,
    pub tokens_available: u32,
    pub next_available_in_ms: Option<u64>,
}

/// Token bucket rate limiter.
///
/// Holds `burst_limit` tokens. A granted token becomes available again exactly
/// one `window` after it was granted, so any interval of length `window` sees
/// at most `burst_limit` grants.
#[derive(Debug)]
pub struct TokenBucket {
    burst_limit: u32,
    window: Duration,
    /// Grant instants still inside the window, oldest first.
    grants: VecDeque<Instant>,
}

impl TokenBucket {
    /// Create a new bucket. The bucket starts full.
    pub fn new(burst_limit: u32, window: Duration) -> Self {
        Self {
            burst_limit: burst_limit.max(1),
            window,
            grants: VecDeque::with_capacity(burst_limit as usize),
        }
    }

    /// Try to acquire a token.
    ///
    /// Returns `Err(wait)` with the time until the oldest grant expires when
    /// the bucket is empty.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.try_acquire_at(Instant::now())
    }

    pub(crate) fn try_acquire_at(&mut self, now: Instant) -> Result<(), Duration> {
        self.expire(now);

        if (self.grants.len() as u32) < self.burst_limit {
            self.grants.push_back(now);
            return Ok(());
        }

        match self.grants.front() {
            Some(oldest) => Err((*oldest + self.window).saturating_duration_since(now)),
            None => Ok(()),
        }
    }

    /// Get the current rate limit status.
    pub fn status(&mut self) -> RateLimitStatus {
        let now = Instant::now();
        self.expire(now);
        let available = self.burst_limit - self.grants.len() as u32;
        RateLimitStatus {
            burst_limit: self.burst_limit,
            window: self.window,
            tokens_available: available,
            next_available_in_ms: if available > 0 {
                None
            } else {
                self.grants
                    .front()
                    .map(|oldest| (*oldest + self.window).saturating_duration_since(now).as_millis() as u64)
            },
        }
    }

    fn expire(&mut self, now: Instant) {
        while let Some(oldest) = self.grants.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }
}
