//! Token admission plus the 429 cooldown window for one client.

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::backoff::MAX_COOLDOWN;
use super::token_bucket::{RateLimitStatus, TokenBucket};

/// Rate limiter owned by a single client.
///
/// Callers are suspended (or the thread sleeps, for blocking callers) until a
/// token frees; waiting never spins on the lock.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    cooldown_until: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(burst_limit: u32, window: Duration) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(burst_limit, window)),
            cooldown_until: Mutex::new(None),
        }
    }

    /// Wait cooperatively until a token is granted.
    ///
    /// Cancelling the future between sleeps gives up without consuming a token.
    pub async fn acquire(&self) -> Duration {
        let start = Instant::now();
        loop {
            let wait = self.bucket.lock().try_acquire();
            match wait {
                Ok(()) => return start.elapsed(),
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limited, waiting for token");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Block the calling thread until a token is granted.
    pub fn acquire_blocking(&self) -> Duration {
        let start = Instant::now();
        loop {
            let wait = self.bucket.lock().try_acquire();
            match wait {
                Ok(()) => return start.elapsed(),
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Rate limited, waiting for token");
                    std::thread::sleep(wait);
                }
            }
        }
    }

    /// Non-waiting variant of [`RateLimiter::acquire`].
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.bucket.lock().try_acquire()
    }

    /// Start (or extend) a cooldown window after a 429.
    pub fn enter_cooldown(&self, duration: Duration) {
        let now = Instant::now();
        let until = now
            .checked_add(duration.min(MAX_COOLDOWN))
            .unwrap_or(now);
        let mut cooldown = self.cooldown_until.lock();
        match *cooldown {
            Some(existing) if existing >= until => {}
            _ => *cooldown = Some(until),
        }
    }

    /// Time left in the current cooldown, if any.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let mut cooldown = self.cooldown_until.lock();
        match *cooldown {
            Some(until) => {
                let now = Instant::now();
                if until > now {
                    Some(until - now)
                } else {
                    *cooldown = None;
                    None
                }
            }
            None => None,
        }
    }

    pub fn status(&self) -> RateLimitStatus {
        self.bucket.lock().status()
    }
}
