//! Mock pooled resource for testing pools in isolation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::pool::Poolable;

/// A numbered resource that remembers whether the pool closed it.
#[derive(Debug)]
pub struct MockPoolable {
    /// Creation order, assigned by the test's factory.
    pub id: usize,
    closed: Arc<AtomicBool>,
}

impl MockPoolable {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that stays readable after the resource is dropped.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Poolable for MockPoolable {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
