//! Fixed-capacity pool for async callers.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::state::{Checkout, PoolState};
use super::{ClientFactory, PoolError, PoolHealth, PoolObserver, PoolStatistics, Poolable};
use crate::metrics;

struct Shared<C: Poolable> {
    state: Mutex<PoolState<C>>,
    released: Notify,
}

impl<C: Poolable> Shared<C> {
    fn checkin(&self, client: C, generation: u64) {
        let destroyed = self.state.lock().checkin(client, generation);
        self.released.notify_one();
        if let Some(client) = destroyed {
            client.close();
        }
    }
}

/// Same contract as [`super::BoundedClientPool`], but waiting suspends the
/// task. The lock is never held across an await point.
pub struct AsyncClientPool<C: Poolable> {
    shared: Arc<Shared<C>>,
    factory: ClientFactory<C>,
    default_timeout: Option<Duration>,
}

/// Owned checkout guard. Dropping it returns the client, so release happens
/// on every exit path, including cancellation of the holding task.
pub struct AsyncPooledClient<C: Poolable> {
    shared: Arc<Shared<C>>,
    client: Option<C>,
    generation: u64,
}

impl<C: Poolable> Deref for AsyncPooledClient<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.client.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<C: Poolable> Drop for AsyncPooledClient<C> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.shared.checkin(client, self.generation);
        }
    }
}

impl<C: Poolable> AsyncClientPool<C> {
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
        debug!(initial_size, max_size, "Async client pool ready");

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                released: Notify::new(),
            }),
            factory,
            default_timeout,
        })
    }

    /// Check a client out, suspending up to `timeout` (or the pool default).
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<AsyncPooledClient<C>, PoolError> {
        let start = Instant::now();
        let deadline = timeout.or(self.default_timeout).map(|t| start + t);
        let mut timed_out = false;
        let mut waited = false;

        self.shared.state.lock().begin_request();
        loop {
            // Register interest before looking at the state so a release in
            // between is not missed.
            let notified = self.shared.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let checkout = {
                let mut state = self.shared.state.lock();
                let checkout = state.checkout()?;
                if matches!(checkout, Checkout::Exhausted) {
                    if timed_out {
                        state.record_timeout();
                    } else if !waited {
                        state.record_wait();
                    }
                }
                checkout
            };

            match checkout {
                Checkout::Ready(client, generation) => {
                    metrics::POOL_ACQUIRE_WAIT.observe(start.elapsed().as_secs_f64());
                    return Ok(self.guard(client, generation));
                }
                Checkout::Create(generation) => {
                    return match (self.factory)() {
                        Ok(client) => {
                            self.shared.state.lock().creation_succeeded();
                            metrics::POOL_ACQUIRE_WAIT.observe(start.elapsed().as_secs_f64());
                            Ok(self.guard(client, generation))
                        }
                        Err(e) => {
                            self.shared.state.lock().creation_failed();
                            self.shared.released.notify_one();
                            warn!(error = %e, "Failed to create pooled client");
                            Err(PoolError::Create(e))
                        }
                    };
                }
                Checkout::Exhausted if timed_out => {
                    let waited = start.elapsed();
                    warn!(waited_ms = waited.as_millis() as u64, "Pool acquire timed out");
                    return Err(PoolError::Timeout { waited });
                }
                Checkout::Exhausted => {
                    waited = true;
                    match deadline {
                        Some(deadline) => {
                            timed_out = tokio::time::timeout_at(deadline, notified).await.is_err();
                        }
                        None => notified.await,
                    }
                }
            }
        }
    }

    pub fn resize(&self, max_size: usize) {
        let excess = self.shared.state.lock().resize(max_size);
        self.shared.released.notify_waiters();
        for client in excess {
            client.close();
        }
    }

    pub fn clear(&self) {
        let drained = self.shared.state.lock().clear();
        self.shared.released.notify_waiters();
        for client in drained {
            client.close();
        }
    }

    /// Destroy idle clients and fail every waiter with [`PoolError::Closed`].
    pub fn close(&self) {
        let drained = self.shared.state.lock().close();
        self.shared.released.notify_waiters();
        for client in drained {
            client.close();
        }
    }

    /// Visit every client not currently checked out.
    pub fn for_each_idle(&self, f: impl Fn(&C)) {
        let state = self.shared.state.lock();
        for client in state.idle() {
            f(client);
        }
    }

    pub fn stats(&self) -> PoolStatistics {
        self.shared.state.lock().stats()
    }

    pub fn health_check(&self) -> PoolHealth {
        PoolHealth::evaluate(self.stats())
    }

    fn guard(&self, client: C, generation: u64) -> AsyncPooledClient<C> {
        AsyncPooledClient {
            shared: Arc::clone(&self.shared),
            client: Some(client),
            generation,
        }
    }

    #[cfg(test)]
    fn invariant_holds(&self) -> bool {
        self.shared.state.lock().invariant_holds()
    }
}

impl<C: Poolable> PoolObserver for AsyncClientPool<C> {
    fn pool_stats(&self) -> PoolStatistics {
        self.stats()
    }
}

impl<C: Poolable> Drop for AsyncClientPool<C> {
    fn drop(&mut self) {
        self.close();
    }
}
