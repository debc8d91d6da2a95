//! Fixed-capacity pool for thread-based callers.

use std::ops::Deref;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use super::state::{Checkout, PoolState};
use super::{ClientFactory, ClientPool, PoolError, PoolHealth, PoolObserver, PoolStatistics, Poolable};
use crate::metrics;

/// Pool whose acquirers block on a condition variable when at capacity.
pub struct BoundedClientPool<C: Poolable> {
    state: Mutex<PoolState<C>>,
    released: Condvar,
    factory: ClientFactory<C>,
    default_timeout: Option<Duration>,
}

/// A checked-out client. Returned to the pool on drop.
pub struct PooledClient<'a, C: Poolable> {
    pool: &'a BoundedClientPool<C>,
    client: Option<C>,
    generation: u64,
}

impl<C: Poolable> Deref for PooledClient<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only taken in drop.
        self.client.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<C: Poolable> Drop for PooledClient<'_, C> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.checkin(client, self.generation);
        }
    }
}

impl<C: Poolable> BoundedClientPool<C> {
    /// Create the pool with `initial_size` clients already built.
    pub fn new(
        factory: ClientFactory<C>,
        initial_size: usize,
        max_size: usize,
        default_timeout: Option<Duration>,
    ) -> Result<Self, PoolError> {
        let mut state = PoolState::new(max_size);
        for _ in 0..initial_size.min(max_size) {
            let client = factory()?;
            if let Err(client) = state.add_idle(client) {
                client.close();
            }
        }
        debug!(initial_size, max_size, "Bounded client pool ready");

        Ok(Self {
            state: Mutex::new(state),
            released: Condvar::new(),
            factory,
            default_timeout,
        })
    }

    /// Check a client out, waiting up to `timeout` (or the pool default;
    /// `None` for both waits forever).
    pub fn acquire(&self, timeout: Option<Duration>) -> Result<PooledClient<'_, C>, PoolError> {
        let start = Instant::now();
        let deadline = timeout.or(self.default_timeout).map(|t| start + t);
        let mut timed_out = false;
        let mut waited = false;

        let mut state = self.state.lock();
        state.begin_request();
        loop {
            match state.checkout()? {
                Checkout::Ready(client, generation) => {
                    metrics::POOL_ACQUIRE_WAIT.observe(start.elapsed().as_secs_f64());
                    return Ok(self.guard(client, generation));
                }
                Checkout::Create(generation) => {
                    drop(state);
                    return match (self.factory)() {
                        Ok(client) => {
                            self.state.lock().creation_succeeded();
                            metrics::POOL_ACQUIRE_WAIT.observe(start.elapsed().as_secs_f64());
                            Ok(self.guard(client, generation))
                        }
                        Err(e) => {
                            self.state.lock().creation_failed();
                            self.released.notify_one();
                            warn!(error = %e, "Failed to create pooled client");
                            Err(PoolError::Create(e))
                        }
                    };
                }
                Checkout::Exhausted if timed_out => {
                    state.record_timeout();
                    let waited = start.elapsed();
                    warn!(waited_ms = waited.as_millis() as u64, "Pool acquire timed out");
                    return Err(PoolError::Timeout { waited });
                }
                Checkout::Exhausted => {
                    if !waited {
                        state.record_wait();
                        waited = true;
                    }
                    match deadline {
                        Some(deadline) => {
                            timed_out = self.released.wait_until(&mut state, deadline).timed_out();
                        }
                        None => self.released.wait(&mut state),
                    }
                }
            }
        }
    }

    /// Explicit release; same as dropping the guard.
    pub fn release(&self, client: PooledClient<'_, C>) {
        drop(client);
    }

    /// Change capacity. Excess idle clients are destroyed now, excess
    /// checked-out ones when they come back.
    pub fn resize(&self, max_size: usize) {
        let excess = self.state.lock().resize(max_size);
        self.released.notify_all();
        debug!(max_size, destroyed = excess.len(), "Pool resized");
        for client in excess {
            client.close();
        }
    }

    /// Destroy all clients and reset counters.
    pub fn clear(&self) {
        let drained = self.state.lock().clear();
        self.released.notify_all();
        for client in drained {
            client.close();
        }
    }

    /// Destroy idle clients and fail every waiter with [`PoolError::Closed`].
    pub fn close(&self) {
        let drained = self.state.lock().close();
        self.released.notify_all();
        for client in drained {
            client.close();
        }
    }

    pub fn stats(&self) -> PoolStatistics {
        self.state.lock().stats()
    }

    pub fn health_check(&self) -> PoolHealth {
        PoolHealth::evaluate(self.stats())
    }

    fn guard(&self, client: C, generation: u64) -> PooledClient<'_, C> {
        PooledClient {
            pool: self,
            client: Some(client),
            generation,
        }
    }

    fn checkin(&self, client: C, generation: u64) {
        let destroyed = self.state.lock().checkin(client, generation);
        self.released.notify_one();
        if let Some(client) = destroyed {
            client.close();
        }
    }

    #[cfg(test)]
    fn invariant_holds(&self) -> bool {
        self.state.lock().invariant_holds()
    }
}

impl<C: Poolable> ClientPool<C> for BoundedClientPool<C> {
    fn with_client<R>(&self, f: impl FnOnce(&C) -> R) -> Result<R, PoolError> {
        let client = self.acquire(None)?;
        Ok(f(&client))
    }

    fn stats(&self) -> PoolStatistics {
        BoundedClientPool::stats(self)
    }

    fn for_each_idle(&self, f: &dyn Fn(&C)) {
        let state = self.state.lock();
        if state.is_closed() {
            return;
        }
        for client in state.idle() {
            f(client);
        }
    }

    fn clear(&self) {
        BoundedClientPool::clear(self)
    }

    fn close(&self) {
        BoundedClientPool::close(self)
    }
}

impl<C: Poolable> PoolObserver for BoundedClientPool<C> {
    fn pool_stats(&self) -> PoolStatistics {
        self.stats()
    }
}

impl<C: Poolable> Drop for BoundedClientPool<C> {
    fn drop(&mut self) {
        self.close();
    }
}
