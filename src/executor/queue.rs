//! Concurrency gate for engine executions.
//!
//! A semaphore caps how many engine subprocesses run at once; waiters
//! queue in FIFO order. The gate also tracks how many callers are
//! currently parked so metrics can report queue depth.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_MAX_CONCURRENT: usize = 2;

#[derive(Debug)]
pub struct ScanGate {
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
    max_concurrent: usize,
}

impl ScanGate {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            waiting: AtomicUsize::new(0),
            max_concurrent,
        }
    }

    /// Wait for an execution slot. The returned permit releases the slot
    /// on drop.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.waiting.fetch_add(1, Ordering::Relaxed);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("gate semaphore is never closed"));
        self.waiting.fetch_sub(1, Ordering::Relaxed);
        permit
    }

    /// Callers currently waiting for a slot.
    pub fn queued(&self) -> usize {
        self.waiting.load(Ordering::Relaxed)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

impl Default for ScanGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}
