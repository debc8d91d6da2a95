//! Admission control and retry policy for outbound catalog calls.
//!
//! Every pooled client owns one [`RateLimiter`] (token bucket + 429 cooldown),
//! one in-flight limiter and one [`RetryPolicy`]. Nothing here is shared
//! between clients, so limits are per client rather than global.

mod backoff;
mod concurrency;
mod rate_limiter;
mod stats;
mod token_bucket;

pub use backoff::{BackoffPolicy, ErrorClass, RetryDecision, RetryPolicy, MAX_COOLDOWN};
pub use concurrency::{BlockingPermit, BlockingSemaphore};
pub use rate_limiter::RateLimiter;
pub use stats::{RequestCounters, RetryStats};
pub use token_bucket::{RateLimitStatus, TokenBucket};
