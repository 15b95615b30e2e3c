//! Deadline propagation for store operations
//!
//! Every contract operation takes a [`Deadline`]. Backends must give up with
//! [`Error::DeadlineExceeded`] instead of blocking past it, and an already
//! elapsed deadline fails before any state is touched. This is the only
//! suspension point in the engine.

use std::time::{Duration, Instant};

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// A point in time after which an operation must not keep waiting
///
/// The default value carries no deadline and never expires.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline; waits are unbounded
    pub fn none() -> Self {
        Self(None)
    }

    /// Deadline at an absolute instant
    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Deadline a duration from now
    pub fn within(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    /// Whether the deadline has already elapsed
    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| at <= Instant::now())
    }

    /// The underlying instant, if any
    pub fn instant(&self) -> Option<Instant> {
        self.0
    }
}

/// Exclusive lock with bounded-wait acquisition
///
/// A standard async mutex plus an acquisition call that returns
/// [`Error::DeadlineExceeded`] instead of blocking past the caller's
/// deadline. The lock itself is never poisoned or skipped; only the wait is
/// bounded.
#[derive(Debug, Default)]
pub struct DeadlineMutex<T> {
    inner: Mutex<T>,
}

impl<T> DeadlineMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock with no deadline
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().await
    }

    /// Acquire the lock, giving up once `deadline` elapses
    ///
    /// An already-expired deadline fails immediately without attempting the
    /// acquisition at all.
    pub async fn lock_by(&self, deadline: Deadline) -> Result<MutexGuard<'_, T>> {
        if deadline.is_expired() {
            return Err(Error::DeadlineExceeded);
        }
        match deadline.instant() {
            None => Ok(self.inner.lock().await),
            Some(at) => tokio::time::timeout_at(at.into(), self.inner.lock())
                .await
                .map_err(|_| Error::DeadlineExceeded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_deadline_always_acquires() {
        let mutex = DeadlineMutex::new(7u32);
        let guard = mutex.lock_by(Deadline::none()).await.unwrap();
        assert_eq!(*guard, 7);
    }

    #[tokio::test]
    async fn elapsed_deadline_fails_immediately() {
        let mutex = DeadlineMutex::new(());
        let result = mutex.lock_by(Deadline::within(Duration::ZERO)).await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn contended_lock_gives_up_at_deadline() {
        let mutex = DeadlineMutex::new(());
        let guard = mutex.lock_by(Deadline::none()).await.unwrap();

        let result = mutex
            .lock_by(Deadline::within(Duration::from_millis(20)))
            .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));

        drop(guard);
        assert!(mutex.lock_by(Deadline::none()).await.is_ok());
    }
}
