//! Open/dispose counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every binder of one registry.
#[derive(Debug, Default)]
pub struct Stats {
    pub(crate) opened: AtomicU64,
    pub(crate) disposed: AtomicU64,
    pub(crate) dispose_failures: AtomicU64,
}

impl Stats {
    /// Take a point-in-time copy of the counters.
    ///
    /// Live-instance fields are left at zero; [`Registry::stats`] fills them.
    ///
    /// [`Registry::stats`]: crate::registry::Registry::stats
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            opened: self.opened.load(Ordering::Relaxed),
            disposed: self.disposed.load(Ordering::Relaxed),
            dispose_failures: self.dispose_failures.load(Ordering::Relaxed),
            ..StatsSnapshot::default()
        }
    }
}

/// Point-in-time view of a registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Arenas opened
    pub opened: u64,
    /// Dispose calls made, failed ones included
    pub disposed: u64,
    /// Dispose calls that reported an error
    pub dispose_failures: u64,
    /// Requests with a bound arena
    pub live_requests: usize,
    /// Sessions tracked on this node, active or passivated
    pub live_sessions: usize,
    /// Whether the process-wide arena is published
    pub singleton_bound: bool,
}

impl StatsSnapshot {
    /// Arenas opened and not yet handed to dispose.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.opened.saturating_sub(self.disposed)
    }
}
