//! Engine-count consistency guard.
//!
//! A guard runs right after every successful
//! [`Backend::open_engine`](crate::Backend::open_engine) and may abort the
//! process when too many engines are open at once. It is meant for tests and
//! fault injection, where a leak of open engines must fail loudly instead of
//! being reported as an ordinary error.

use crate::stats::EngineCountSnapshot;
use std::fmt;

/// Policy consulted after an engine is opened.
pub trait EngineCountGuard: Send + Sync + fmt::Debug {
    /// Inspects the counters. May panic to abort the process.
    fn check(&self, counts: EngineCountSnapshot);
}

/// Guard that never fires.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGuard;

impl EngineCountGuard for NoopGuard {
    fn check(&self, _counts: EngineCountSnapshot) {}
}

/// Guard that panics when more than `max_in_flight` engines are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCountLimit {
    max_in_flight: i64,
}

impl EngineCountLimit {
    /// Creates a guard with the given ceiling.
    pub const fn new(max_in_flight: i64) -> Self {
        Self { max_in_flight }
    }

    /// The configured ceiling.
    pub const fn max_in_flight(&self) -> i64 {
        self.max_in_flight
    }

    /// Returns true if `counts` exceeds the ceiling.
    pub fn is_exceeded(&self, counts: EngineCountSnapshot) -> bool {
        counts.in_flight() > self.max_in_flight
    }
}

impl EngineCountGuard for EngineCountLimit {
    fn check(&self, counts: EngineCountSnapshot) {
        if self.is_exceeded(counts) {
            tracing::error!(
                opened = counts.opened,
                closed = counts.closed,
                limit = self.max_in_flight,
                "engine count exceeds limit"
            );
            panic!(
                "forcing failure due to engine count limit: {} - {} > {}",
                counts.opened, counts.closed, self.max_in_flight
            );
        }
    }
}
