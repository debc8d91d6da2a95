//! Bookkeeping shared by the bounded pools.
//!
//! Only ever touched under the owning pool's lock. Clients that must be
//! destroyed are handed back to the caller so `close()` runs outside it.

use std::collections::VecDeque;

use super::{PoolError, PoolStatistics};

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PoolCounters {
    pub total_requests: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub clients_created: u64,
    pub clients_destroyed: u64,
    pub waits: u64,
    pub timeouts: u64,
}

impl PoolCounters {
    pub fn snapshot(&self, active: usize, idle: usize, max_size: usize) -> PoolStatistics {
        PoolStatistics {
            total_requests: self.total_requests,
            pool_hits: self.pool_hits,
            pool_misses: self.pool_misses,
            clients_created: self.clients_created,
            clients_destroyed: self.clients_destroyed,
            active_clients: active,
            idle_clients: idle,
            max_size,
            waits: self.waits,
            timeouts: self.timeouts,
        }
    }
}

/// Result of trying to check a client out.
pub(crate) enum Checkout<C> {
    /// Reused an idle client.
    Ready(C, u64),
    /// A slot was reserved; the caller must build the client and then call
    /// `creation_succeeded` or `creation_failed`.
    Create(u64),
    /// At capacity.
    Exhausted,
}

pub(crate) struct PoolState<C> {
    /// Most recently returned at the back; reuse is LIFO so warm caches win.
    idle: VecDeque<C>,
    active: usize,
    created: usize,
    max_size: usize,
    closed: bool,
    /// Bumped by `clear`; clients from older generations are destroyed on return.
    generation: u64,
    counters: PoolCounters,
}

impl<C> PoolState<C> {
    pub fn new(max_size: usize) -> Self {
        Self {
            idle: VecDeque::new(),
            active: 0,
            created: 0,
            max_size: max_size.max(1),
            closed: false,
            generation: 0,
            counters: PoolCounters::default(),
        }
    }

    /// Add a pre-built idle client (warm set). Returns it back if full or closed.
    pub fn add_idle(&mut self, client: C) -> Result<(), C> {
        if self.closed || self.created >= self.max_size {
            return Err(client);
        }
        self.created += 1;
        self.counters.clients_created += 1;
        self.idle.push_back(client);
        Ok(())
    }

    pub fn begin_request(&mut self) {
        self.counters.total_requests += 1;
    }

    pub fn checkout(&mut self) -> Result<Checkout<C>, PoolError> {
        if self.closed {
            return Err(PoolError::Closed);
        }
        if let Some(client) = self.idle.pop_back() {
            self.active += 1;
            self.counters.pool_hits += 1;
            return Ok(Checkout::Ready(client, self.generation));
        }
        if self.created < self.max_size {
            self.created += 1;
            self.active += 1;
            self.counters.pool_misses += 1;
            return Ok(Checkout::Create(self.generation));
        }
        Ok(Checkout::Exhausted)
    }

    pub fn creation_succeeded(&mut self) {
        self.counters.clients_created += 1;
    }

    /// Give back a slot reserved by `Checkout::Create`.
    pub fn creation_failed(&mut self) {
        self.created -= 1;
        self.active -= 1;
    }

    /// Return a checked-out client. Yields it back when it must be destroyed
    /// (pool closed, shrunk below the live count, or cleared since checkout).
    pub fn checkin(&mut self, client: C, generation: u64) -> Option<C> {
        self.active -= 1;
        if self.closed || self.created > self.max_size || generation != self.generation {
            self.created -= 1;
            self.counters.clients_destroyed += 1;
            return Some(client);
        }
        self.idle.push_back(client);
        None
    }

    /// Change capacity; returns idle clients that no longer fit, oldest first.
    pub fn resize(&mut self, max_size: usize) -> Vec<C> {
        self.max_size = max_size.max(1);
        let mut excess = Vec::new();
        while self.created > self.max_size {
            match self.idle.pop_front() {
                Some(client) => {
                    self.created -= 1;
                    self.counters.clients_destroyed += 1;
                    excess.push(client);
                }
                None => break,
            }
        }
        excess
    }

    /// Destroy idle clients, retire checked-out ones and reset counters.
    pub fn clear(&mut self) -> Vec<C> {
        let drained = self.drain_idle();
        self.generation += 1;
        self.counters = PoolCounters::default();
        drained
    }

    pub fn close(&mut self) -> Vec<C> {
        self.closed = true;
        self.drain_idle()
    }

    fn drain_idle(&mut self) -> Vec<C> {
        let drained: Vec<C> = self.idle.drain(..).collect();
        self.created -= drained.len();
        self.counters.clients_destroyed += drained.len() as u64;
        drained
    }

    pub fn idle(&self) -> impl Iterator<Item = &C> {
        self.idle.iter()
    }

    pub fn record_wait(&mut self) {
        self.counters.waits += 1;
    }

    pub fn record_timeout(&mut self) {
        self.counters.timeouts += 1;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> PoolStatistics {
        self.counters
            .snapshot(self.active, self.idle.len(), self.max_size)
    }

    /// `active + idle == created` and `created <= max_size` unless shrinking.
    #[cfg(test)]
    pub fn invariant_holds(&self) -> bool {
        self.active + self.idle.len() == self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take(state: &mut PoolState<u32>, next_id: &mut u32) -> (u32, u64) {
        match state.checkout().unwrap() {
            Checkout::Ready(c, g) => (c, g),
            Checkout::Create(g) => {
                state.creation_succeeded();
                *next_id += 1;
                (*next_id, g)
            }
            Checkout::Exhausted => panic!("pool exhausted"),
        }
    }

    #[test]
    fn test_checkout_prefers_idle_lifo() {
        let mut state = PoolState::new(3);
        let mut next = 0;
        let (a, ga) = take(&mut state, &mut next);
        let (b, gb) = take(&mut state, &mut next);
        assert!(state.checkin(a, ga).is_none());
        assert!(state.checkin(b, gb).is_none());

        // Most recently returned comes out first.
        let (c, _) = take(&mut state, &mut next);
        assert_eq!(c, b);
        assert!(state.invariant_holds());

        let stats = state.stats();
        assert_eq!(stats.pool_hits, 1);
        assert_eq!(stats.pool_misses, 2);
        assert_eq!(stats.clients_created, 2);
    }

    #[test]
    fn test_exhausted_at_capacity() {
        let mut state: PoolState<u32> = PoolState::new(1);
        let mut next = 0;
        take(&mut state, &mut next);
        assert!(matches!(state.checkout().unwrap(), Checkout::Exhausted));
        assert!(state.invariant_holds());
    }

    #[test]
    fn test_creation_failure_rolls_back_slot() {
        let mut state: PoolState<u32> = PoolState::new(1);
        assert!(matches!(state.checkout().unwrap(), Checkout::Create(_)));
        state.creation_failed();
        assert!(state.invariant_holds());
        assert!(matches!(state.checkout().unwrap(), Checkout::Create(_)));
    }

    #[test]
    fn test_resize_destroys_excess_idle_then_active_on_return() {
        let mut state = PoolState::new(3);
        let mut next = 0;
        let taken: Vec<_> = (0..3).map(|_| take(&mut state, &mut next)).collect();
        let (first, g) = taken[0];
        state.checkin(first, g);

        let excess = state.resize(1);
        assert_eq!(excess, vec![first]);
        assert!(state.invariant_holds());

        // Two still active against a capacity of one: the first one back is destroyed.
        assert_eq!(state.checkin(taken[1].0, taken[1].1), Some(taken[1].0));
        assert!(state.checkin(taken[2].0, taken[2].1).is_none());
        assert!(state.invariant_holds());
        assert_eq!(state.stats().clients_destroyed, 2);
    }

    #[test]
    fn test_clear_retires_checked_out_clients() {
        let mut state = PoolState::new(2);
        let mut next = 0;
        let (a, ga) = take(&mut state, &mut next);
        let (b, gb) = take(&mut state, &mut next);
        state.checkin(b, gb);

        assert_eq!(state.clear(), vec![b]);
        assert_eq!(state.stats().total_requests, 0);
        assert_eq!(state.checkin(a, ga), Some(a));
        assert!(state.invariant_holds());
        assert_eq!(state.stats().idle_clients, 0);
    }

    #[test]
    fn test_closed_rejects_checkout() {
        let mut state: PoolState<u32> = PoolState::new(2);
        state.add_idle(7).unwrap();
        assert_eq!(state.close(), vec![7]);
        assert!(matches!(state.checkout(), Err(PoolError::Closed)));
        assert!(state.add_idle(8).is_err());
    }
}
