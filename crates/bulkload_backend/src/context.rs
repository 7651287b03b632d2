//! Cancellation context passed to every blocking operation.

use crate::error::{BackendError, BackendResult};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cancellation token with an optional deadline.
///
/// Clones share the same token: cancelling any clone cancels all of them.
/// Backends are expected to call [`Context::check`] at their own blocking
/// points; retry loops in this crate sleep through [`Context::sleep`], which
/// returns as soon as the context is cancelled.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless [`Context::cancel`] is called.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner {
                deadline: Some(deadline),
                ..Inner::default()
            }),
        }
    }

    /// A context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Cancels the context and wakes every sleeper.
    pub fn cancel(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.wakeup.notify_all();
    }

    /// Returns true if the context was cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Fails with [`BackendError::Cancelled`] or
    /// [`BackendError::DeadlineExceeded`] once the context is done.
    pub fn check(&self) -> BackendResult<()> {
        if self.inner.cancelled.load(Ordering::SeqCst) {
            return Err(BackendError::Cancelled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(BackendError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Sleeps for `duration`, returning early with an error if the context is
    /// cancelled or expires in the meantime.
    pub fn sleep(&self, duration: Duration) -> BackendResult<()> {
        let wake_at = Instant::now() + duration;
        let mut guard = self.inner.lock.lock();
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= wake_at {
                return Ok(());
            }
            let until = match self.inner.deadline {
                Some(deadline) if deadline < wake_at => deadline,
                _ => wake_at,
            };
            self.inner.wakeup.wait_until(&mut guard, until);
        }
    }
}
