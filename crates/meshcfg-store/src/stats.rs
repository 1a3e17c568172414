//! Monitor statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one [`Monitor`](crate::Monitor).
///
/// All counters are atomic and can be read from any thread.
#[derive(Debug, Default)]
pub struct MonitorStats {
    /// Events accepted into the queue.
    scheduled: AtomicU64,
    /// Events handed to at least one handler.
    delivered: AtomicU64,
    /// Events dropped because their kind is not in the schema.
    dropped: AtomicU64,
    /// Individual handler calls.
    handler_calls: AtomicU64,
}

impl MonitorStats {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an enqueued event.
    #[inline]
    pub fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event delivered to `handlers` handlers.
    #[inline]
    pub fn record_delivered(&self, handlers: u64) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.handler_calls.fetch_add(handlers, Ordering::Relaxed);
    }

    /// Record a dropped event.
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Events accepted into the queue.
    #[inline]
    pub fn scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    /// Events delivered to handlers.
    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Events dropped for an unknown kind.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Total handler invocations.
    #[inline]
    pub fn handler_calls(&self) -> u64 {
        self.handler_calls.load(Ordering::Relaxed)
    }

    /// Events scheduled but not yet processed.
    pub fn pending(&self) -> u64 {
        self.scheduled()
            .saturating_sub(self.delivered())
            .saturating_sub(self.dropped())
    }
}
