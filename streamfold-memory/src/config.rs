//! Run configuration and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tuning knobs for [`InMemoryEventStore`](crate::InMemoryEventStore) runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStoreConfig {
    /// Consecutive unhandled events after which a projection is marked
    /// `Stalled`. Zero never stalls.
    pub stall_threshold: u64,
    /// Events read from the log per batch. The run yields to the runtime
    /// between batches.
    pub batch_size: usize,
}

impl MemoryStoreConfig {
    /// Sets the stall threshold.
    #[must_use]
    pub const fn with_stall_threshold(mut self, stall_threshold: u64) -> Self {
        self.stall_threshold = stall_threshold;
        self
    }

    /// Sets the batch size; zero is treated as one.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = if batch_size == 0 { 1 } else { batch_size };
        self
    }
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            stall_threshold: 100,
            batch_size: 256,
        }
    }
}

/// A flag that asks running projections to stop between events.
///
/// Clones share the flag. A stopped run saves its checkpoint and reports
/// `cancelled`; calling [`StopSignal::reset`] lets the next run continue
/// where it stopped.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a signal that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Lowers the signal.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether the signal is raised.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
