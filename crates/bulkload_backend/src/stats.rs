//! Engine lifecycle counters.
//!
//! Counters are owned by a [`Backend`](crate::Backend) instance rather than
//! living in a global registry, so independent facades (and tests) never
//! observe each other's engines.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters of opened and closed engines.
#[derive(Debug, Default)]
pub struct EngineCounters {
    /// Engines opened through the facade.
    opened: AtomicU64,
    /// Engines closed through an opened-engine handle.
    closed: AtomicU64,
}

/// A point-in-time copy of [`EngineCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineCountSnapshot {
    /// Engines opened.
    pub opened: u64,
    /// Engines closed.
    pub closed: u64,
}

impl EngineCountSnapshot {
    /// Engines opened but not yet closed.
    ///
    /// Negative when engines restored from a checkpoint were closed without
    /// being opened by this process.
    pub fn in_flight(&self) -> i64 {
        self.opened as i64 - self.closed as i64
    }
}

impl EngineCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_open(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_close(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of engines opened.
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Returns the number of engines closed.
    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    /// Reads both counters.
    pub fn snapshot(&self) -> EngineCountSnapshot {
        EngineCountSnapshot {
            opened: self.opened(),
            closed: self.closed(),
        }
    }
}
