//! Client pools.
//!
//! Three variants share one contract (acquire, release, stats, health):
//! - [`BoundedClientPool`]: fixed capacity, blocks the thread when exhausted.
//! - [`ThreadLocalClientPool`]: one client per thread, never shared.
//! - [`AsyncClientPool`]: fixed capacity, suspends the task when exhausted.
//!
//! Pools only create a client when no idle one is available and capacity
//! allows it, so memory and upstream concurrency stay bounded. For the bounded
//! variants `active + idle == created` holds after every operation.

mod async_pool;
mod bounded;
mod state;
mod thread_local;

pub use async_pool::{AsyncClientPool, AsyncPooledClient};
pub use bounded::{BoundedClientPool, PooledClient};
pub use thread_local::ThreadLocalClientPool;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::{PoolConfig, PoolMode};

/// A client that can live in a pool.
pub trait Poolable: Send + Sync + 'static {
    /// Release the client's resources. Called once, when the pool destroys it.
    fn close(&self);
}

/// Builds a new client on demand.
pub type ClientFactory<C> = Arc<dyn Fn() -> Result<C, CatalogError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum PoolError {
    /// No client became available in time.
    #[error("Timed out after {waited:?} waiting for a pooled client")]
    Timeout { waited: Duration },

    #[error("Pool is closed")]
    Closed,

    #[error("Failed to create client: {0}")]
    Create(#[from] CatalogError),
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatistics {
    /// Acquisitions requested.
    pub total_requests: u64,
    /// Acquisitions served by an existing client.
    pub pool_hits: u64,
    /// Acquisitions that had to create a client.
    pub pool_misses: u64,
    pub clients_created: u64,
    pub clients_destroyed: u64,
    pub active_clients: usize,
    pub idle_clients: usize,
    pub max_size: usize,
    /// Acquisitions that had to wait for a release.
    pub waits: u64,
    pub timeouts: u64,
}

impl PoolStatistics {
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.pool_hits as f64 / self.total_requests as f64
        }
    }

    /// Share of capacity currently checked out.
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active_clients as f64 / self.max_size as f64
        }
    }

    /// Live clients.
    pub fn created_clients(&self) -> usize {
        self.active_clients + self.idle_clients
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthWarning {
    /// More than 90% of capacity in use; consider a larger pool.
    HighUtilization { utilization: f64 },
    /// Under half of acquisitions reuse a client; clients may not be released.
    LowHitRate { hit_rate: f64 },
    /// Every live client is checked out.
    Contention { active: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolHealth {
    pub healthy: bool,
    pub warnings: Vec<HealthWarning>,
    pub stats: PoolStatistics,
}

const HIGH_UTILIZATION: f64 = 0.9;
const LOW_HIT_RATE: f64 = 0.5;
const MIN_REQUESTS_FOR_HIT_RATE: u64 = 10;

impl PoolHealth {
    pub fn evaluate(stats: PoolStatistics) -> Self {
        let mut warnings = Vec::new();

        let utilization = stats.utilization();
        if utilization > HIGH_UTILIZATION {
            warnings.push(HealthWarning::HighUtilization { utilization });
        }
        if stats.total_requests >= MIN_REQUESTS_FOR_HIT_RATE && stats.hit_rate() < LOW_HIT_RATE {
            warnings.push(HealthWarning::LowHitRate {
                hit_rate: stats.hit_rate(),
            });
        }
        if stats.active_clients > 0 && stats.idle_clients == 0 {
            warnings.push(HealthWarning::Contention {
                active: stats.active_clients,
            });
        }

        Self {
            healthy: warnings.is_empty(),
            warnings,
            stats,
        }
    }
}

/// Read-only view of a pool, for monitoring.
pub trait PoolObserver: Send + Sync {
    fn pool_stats(&self) -> PoolStatistics;
}

/// Operations shared by the thread-based pools.
pub trait ClientPool<C: Poolable>: Send + Sync {
    /// Run `f` with a client checked out for its duration.
    fn with_client<R>(&self, f: impl FnOnce(&C) -> R) -> Result<R, PoolError>;

    fn stats(&self) -> PoolStatistics;

    fn health_check(&self) -> PoolHealth {
        PoolHealth::evaluate(self.stats())
    }

    /// Visit every client not currently checked out.
    fn for_each_idle(&self, f: &dyn Fn(&C));

    /// Destroy all clients and reset counters.
    fn clear(&self);

    fn close(&self);
}

/// Thread-based pool selected by [`PoolMode`].
pub enum BlockingPool<C: Poolable> {
    Bounded(BoundedClientPool<C>),
    ThreadLocal(ThreadLocalClientPool<C>),
}

impl<C: Poolable> BlockingPool<C> {
    pub fn from_config(config: &PoolConfig, factory: ClientFactory<C>) -> Result<Self, PoolError> {
        Ok(match config.mode {
            PoolMode::Bounded => BlockingPool::Bounded(BoundedClientPool::new(
                factory,
                config.initial_size,
                config.max_size,
                config.acquire_timeout(),
            )?),
            PoolMode::ThreadLocal => {
                BlockingPool::ThreadLocal(ThreadLocalClientPool::new(factory, config.max_size))
            }
        })
    }
}

impl<C: Poolable> ClientPool<C> for BlockingPool<C> {
    fn with_client<R>(&self, f: impl FnOnce(&C) -> R) -> Result<R, PoolError> {
        match self {
            BlockingPool::Bounded(pool) => pool.with_client(f),
            BlockingPool::ThreadLocal(pool) => pool.with_client(f),
        }
    }

    fn stats(&self) -> PoolStatistics {
        match self {
            BlockingPool::Bounded(pool) => ClientPool::stats(pool),
            BlockingPool::ThreadLocal(pool) => ClientPool::stats(pool),
        }
    }

    fn for_each_idle(&self, f: &dyn Fn(&C)) {
        match self {
            BlockingPool::Bounded(pool) => pool.for_each_idle(f),
            BlockingPool::ThreadLocal(pool) => pool.for_each_idle(f),
        }
    }

    fn clear(&self) {
        match self {
            BlockingPool::Bounded(pool) => ClientPool::clear(pool),
            BlockingPool::ThreadLocal(pool) => ClientPool::clear(pool),
        }
    }

    fn close(&self) {
        match self {
            BlockingPool::Bounded(pool) => ClientPool::close(pool),
            BlockingPool::ThreadLocal(pool) => ClientPool::close(pool),
        }
    }
}

impl<C: Poolable> PoolObserver for BlockingPool<C> {
    fn pool_stats(&self) -> PoolStatistics {
        ClientPool::stats(self)
    }
}
