//! One client per calling thread.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::debug;

use super::state::PoolCounters;
use super::{ClientFactory, ClientPool, PoolError, PoolObserver, PoolStatistics, Poolable};

/// Callbacks run when the owning thread exits.
struct ThreadExit(RefCell<Vec<Box<dyn FnOnce()>>>);

impl Drop for ThreadExit {
    fn drop(&mut self) {
        for hook in self.0.get_mut().drain(..) {
            hook();
        }
    }
}

thread_local! {
    static THREAD_EXIT: ThreadExit = ThreadExit(RefCell::new(Vec::new()));
}

struct Shared<C: Poolable> {
    clients: Mutex<HashMap<ThreadId, Arc<C>>>,
    /// Threads that already carry an exit hook for this pool.
    hooked: Mutex<HashSet<ThreadId>>,
    counters: Mutex<PoolCounters>,
}

impl<C: Poolable> Shared<C> {
    /// Destroy the client owned by `id`, if any.
    fn evict(&self, id: ThreadId) -> bool {
        let removed = self.clients.lock().remove(&id);
        match removed {
            Some(client) => {
                self.counters.lock().clients_destroyed += 1;
                client.close();
                true
            }
            None => false,
        }
    }

    fn drain(&self) -> Vec<Arc<C>> {
        self.clients.lock().drain().map(|(_, c)| c).collect()
    }
}

/// Thread-affinity pool: each thread lazily gets its own client, which is
/// destroyed when the thread exits.
///
/// There is no capacity bound; `max_size` is only the reference for
/// utilization in health reports.
pub struct ThreadLocalClientPool<C: Poolable> {
    shared: Arc<Shared<C>>,
    in_use: AtomicUsize,
    closed: AtomicBool,
    factory: ClientFactory<C>,
    max_size: usize,
}

impl<C: Poolable> ThreadLocalClientPool<C> {
    pub fn new(factory: ClientFactory<C>, max_size: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                clients: Mutex::new(HashMap::new()),
                hooked: Mutex::new(HashSet::new()),
                counters: Mutex::new(PoolCounters::default()),
            }),
            in_use: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            factory,
            max_size,
        }
    }

    /// The calling thread's client, created on first use.
    pub fn acquire(&self) -> Result<Arc<C>, PoolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }
        let id = thread::current().id();
        self.shared.counters.lock().total_requests += 1;

        if let Some(client) = self.shared.clients.lock().get(&id) {
            self.shared.counters.lock().pool_hits += 1;
            return Ok(Arc::clone(client));
        }

        // Only this thread ever inserts under its own id, so building the
        // client outside the lock cannot race.
        let client = Arc::new((self.factory)()?);
        self.shared.clients.lock().insert(id, Arc::clone(&client));
        {
            let mut counters = self.shared.counters.lock();
            counters.pool_misses += 1;
            counters.clients_created += 1;
        }
        self.hook_thread_exit(id);
        debug!(thread = ?id, "Created thread-local client");
        Ok(client)
    }

    /// Arrange for the calling thread's client to be destroyed when the
    /// thread exits. Registered once per thread for the pool's lifetime.
    fn hook_thread_exit(&self, id: ThreadId) {
        if !self.shared.hooked.lock().insert(id) {
            return;
        }
        let shared: Weak<Shared<C>> = Arc::downgrade(&self.shared);
        let registered = THREAD_EXIT.try_with(|exit| {
            exit.0.borrow_mut().push(Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.hooked.lock().remove(&id);
                    if shared.evict(id) {
                        debug!(thread = ?id, "Thread exited, destroyed its client");
                    }
                }
            }));
        });
        if registered.is_err() {
            // Thread is already tearing down; the entry goes on the next clear.
            self.shared.hooked.lock().remove(&id);
        }
    }

    /// Destroy the calling thread's client, if it has one.
    pub fn release_current_thread(&self) {
        self.shared.evict(thread::current().id());
    }

    /// Destroy every thread's client and reset counters.
    pub fn clear(&self) {
        let drained = self.shared.drain();
        *self.shared.counters.lock() = PoolCounters::default();
        for client in drained {
            client.close();
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained = self.shared.drain();
        self.shared.counters.lock().clients_destroyed += drained.len() as u64;
        for client in drained {
            client.close();
        }
    }

    /// `active` counts clients inside [`ClientPool::with_client`] right now.
    pub fn stats(&self) -> PoolStatistics {
        let live = self.shared.clients.lock().len();
        let active = self.in_use.load(Ordering::SeqCst).min(live);
        self.shared
            .counters
            .lock()
            .snapshot(active, live - active, self.max_size)
    }
}

impl<C: Poolable> ClientPool<C> for ThreadLocalClientPool<C> {
    fn with_client<R>(&self, f: impl FnOnce(&C) -> R) -> Result<R, PoolError> {
        let client = self.acquire()?;
        self.in_use.fetch_add(1, Ordering::SeqCst);
        let result = f(&client);
        self.in_use.fetch_sub(1, Ordering::SeqCst);
        Ok(result)
    }

    fn stats(&self) -> PoolStatistics {
        ThreadLocalClientPool::stats(self)
    }

    fn for_each_idle(&self, f: &dyn Fn(&C)) {
        let clients: Vec<Arc<C>> = self.shared.clients.lock().values().cloned().collect();
        for client in clients {
            f(&client);
        }
    }

    fn clear(&self) {
        ThreadLocalClientPool::clear(self)
    }

    fn close(&self) {
        ThreadLocalClientPool::close(self)
    }
}

impl<C: Poolable> PoolObserver for ThreadLocalClientPool<C> {
    fn pool_stats(&self) -> PoolStatistics {
        self.stats()
    }
}

impl<C: Poolable> Drop for ThreadLocalClientPool<C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPoolable;

    fn pool() -> Arc<ThreadLocalClientPool<MockPoolable>> {
        let next = Arc::new(AtomicUsize::new(0));
        Arc::new(ThreadLocalClientPool::new(
            Arc::new(move || Ok(MockPoolable::new(next.fetch_add(1, Ordering::SeqCst)))),
            4,
        ))
    }

    #[test]
    fn test_same_thread_gets_same_client() {
        let pool = pool();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let stats = pool.stats();
        assert_eq!(stats.clients_created, 1);
        assert_eq!(stats.pool_hits, 1);
        assert_eq!(stats.pool_misses, 1);
    }

    #[test]
    fn test_each_thread_gets_its_own_client() {
        let pool = pool();
        let main_id = pool.acquire().unwrap().id;

        let other_ids: Vec<usize> = (0..3)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || pool.acquire().unwrap().id)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        assert!(!other_ids.contains(&main_id));
        let stats = pool.stats();
        assert_eq!(stats.clients_created, 4);
        // Only the calling thread is still alive.
        assert_eq!(stats.idle_clients, 1);
        assert_eq!(stats.clients_destroyed, 3);
    }

    #[test]
    fn test_exited_threads_give_back_their_clients() {
        let pool = pool();
        let mut flags = Vec::new();
        for _ in 0..20 {
            let pool = Arc::clone(&pool);
            let flag = thread::spawn(move || pool.acquire().unwrap().closed_flag())
                .join()
                .unwrap();
            flags.push(flag);
        }

        let stats = pool.stats();
        assert_eq!(stats.clients_created, 20);
        assert_eq!(stats.clients_destroyed, 20);
        assert_eq!(stats.idle_clients + stats.active_clients, 0);
        assert!(flags.iter().all(|f| f.load(Ordering::SeqCst)));
    }

    #[test]
    fn test_thread_exit_after_pool_dropped_is_harmless() {
        let pool = pool();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let worker = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let flag = pool.acquire().unwrap().closed_flag();
                drop(pool);
                ready_tx.send(()).unwrap();
                done_rx.recv().unwrap();
                flag
            })
        };
        ready_rx.recv().unwrap();
        drop(pool);
        done_tx.send(()).unwrap();

        // Dropping the pool closed the client; the exit hook finds nothing.
        assert!(worker.join().unwrap().load(Ordering::SeqCst));
    }

    #[test]
    fn test_release_current_thread_destroys_client() {
        let pool = pool();
        let client = pool.acquire().unwrap();
        let flag = client.closed_flag();

        pool.release_current_thread();
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(pool.stats().clients_destroyed, 1);

        let replacement = pool.acquire().unwrap();
        assert_ne!(replacement.id, client.id);
    }

    #[test]
    fn test_with_client_tracks_active() {
        let pool = pool();
        let active = pool
            .with_client(|_| pool.stats().active_clients)
            .unwrap();
        assert_eq!(active, 1);
        assert_eq!(pool.stats().active_clients, 0);
    }

    #[test]
    fn test_closed_pool_rejects() {
        let pool = pool();
        pool.acquire().unwrap();
        pool.close();
        assert!(matches!(pool.acquire(), Err(PoolError::Closed)));
        assert_eq!(pool.stats().created_clients(), 0);
    }
}
