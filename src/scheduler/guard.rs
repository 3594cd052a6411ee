//! Single-worker exclusivity guard.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Exclusivity token: at most one holder at a time.
///
/// Built on a one-permit semaphore. The permit is released when the
/// returned [`GuardPermit`] is dropped, including during unwinding, so
/// there is no release call to forget.
#[derive(Debug, Clone)]
pub struct WorkerGuard {
    semaphore: Arc<Semaphore>,
}

/// Proof of holding the [`WorkerGuard`].
#[derive(Debug)]
pub struct GuardPermit {
    _permit: OwnedSemaphorePermit,
}

impl WorkerGuard {
    /// Create a free guard.
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the guard if it is free.
    pub fn try_acquire(&self) -> Option<GuardPermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| GuardPermit { _permit: permit })
    }

    /// Wait until the guard is free and take it.
    ///
    /// Returns `None` only if the guard was closed.
    pub async fn acquire(&self) -> Option<GuardPermit> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .ok()
            .map(|permit| GuardPermit { _permit: permit })
    }

    /// Whether someone holds the guard right now.
    pub fn is_held(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

impl Default for WorkerGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let guard = WorkerGuard::new();
        let permit = guard.try_acquire().unwrap();
        assert!(guard.is_held());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_held());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_clones_share_the_permit() {
        let guard = WorkerGuard::new();
        let other = guard.clone();
        let _permit = guard.try_acquire().unwrap();
        assert!(other.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_released_on_panic() {
        let guard = WorkerGuard::new();
        let inner = guard.clone();

        let result = tokio::spawn(async move {
            let _permit = inner.try_acquire().unwrap();
            panic!("boom");
        })
        .await;

        assert!(result.unwrap_err().is_panic());
        assert!(!guard.is_held());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let guard = WorkerGuard::new();
        let permit = guard.try_acquire().unwrap();

        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.acquire().await.is_some() })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(permit);
        assert!(waiter.await.unwrap());
    }
}
