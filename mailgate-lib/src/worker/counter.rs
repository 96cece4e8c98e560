use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Live-worker bookkeeping shared by the dispatcher and every worker
#[derive(Debug)]
pub struct WorkerCounter {
    live: AtomicUsize,
    total: AtomicU64,
    idle_tx: watch::Sender<()>,
}

impl Default for WorkerCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerCounter {
    pub fn new() -> Self {
        let (idle_tx, _) = watch::channel(());
        Self { live: AtomicUsize::new(0), total: AtomicU64::new(0), idle_tx }
    }

    /// Count one more live worker until the returned guard is dropped.
    pub fn register(self: &Arc<Self>) -> WorkerGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::Relaxed);
        WorkerGuard { counter: Arc::clone(self) }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Workers started since the counter was created
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Receiver notified each time the live count drops to zero
    pub fn subscribe_idle(&self) -> watch::Receiver<()> {
        self.idle_tx.subscribe()
    }

    fn release(&self) {
        let previous = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous == 1 {
            self.idle_tx.send_replace(());
        }
    }
}

/// Decrements the live-worker count when the worker ends, however it ends
#[derive(Debug)]
pub struct WorkerGuard {
    counter: Arc<WorkerCounter>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.counter.release();
    }
}
