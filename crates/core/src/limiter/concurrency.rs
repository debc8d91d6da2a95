//! Counting semaphore for the thread-based client.

use parking_lot::{Condvar, Mutex};

/// Bounds simultaneously in-flight calls for blocking callers.
///
/// The cooperative client uses `tokio::sync::Semaphore` for the same job.
#[derive(Debug)]
pub struct BlockingSemaphore {
    available: Mutex<usize>,
    freed: Condvar,
}

/// Returns its slot to the semaphore on drop.
#[derive(Debug)]
pub struct BlockingPermit<'a> {
    semaphore: &'a BlockingSemaphore,
}

impl BlockingSemaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            available: Mutex::new(permits.max(1)),
            freed: Condvar::new(),
        }
    }

    /// Block the calling thread until a slot is free.
    pub fn acquire(&self) -> BlockingPermit<'_> {
        let mut available = self.available.lock();
        while *available == 0 {
            self.freed.wait(&mut available);
        }
        *available -= 1;
        BlockingPermit { semaphore: self }
    }

    pub fn available_permits(&self) -> usize {
        *self.available.lock()
    }
}

impl Drop for BlockingPermit<'_> {
    fn drop(&mut self) {
        *self.semaphore.available.lock() += 1;
        self.semaphore.freed.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_permits_are_returned_on_drop() {
        let semaphore = BlockingSemaphore::new(2);
        {
            let _a = semaphore.acquire();
            let _b = semaphore.acquire();
            assert_eq!(semaphore.available_permits(), 0);
        }
        assert_eq!(semaphore.available_permits(), 2);
    }

    #[test]
    fn test_in_flight_never_exceeds_permits() {
        let semaphore = Arc::new(BlockingSemaphore::new(2));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let semaphore = Arc::clone(&semaphore);
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let _permit = semaphore.acquire();
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
