//! Bounded-wait acquisition of the execution lock.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Scoped result of trying to take a [`Mutex`] within a time bound.
///
/// When acquisition succeeded the lock is held until the guard (or the owned
/// guard taken out of it) is dropped, whichever way the scope exits. When it
/// failed nothing is held and nothing is released; callers must treat that as
/// an error, not retry.
///
/// The guard owns its lock handle so the held lock can move into a spawned
/// task and outlive the caller's future.
#[derive(Debug)]
pub struct BoundedWaitGuard<T> {
    guard: Option<OwnedMutexGuard<T>>,
}

impl<T> BoundedWaitGuard<T> {
    /// Wait up to `timeout` for `lock`.
    pub async fn acquire(lock: &Arc<Mutex<T>>, timeout: Duration) -> Self {
        let guard = tokio::time::timeout(timeout, lock.clone().lock_owned())
            .await
            .ok();
        Self { guard }
    }

    pub fn acquired(&self) -> bool {
        self.guard.is_some()
    }

    /// The protected value, if the lock was obtained.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.guard.as_deref_mut()
    }

    /// Take the held lock out of the guard.
    pub fn into_owned(self) -> Option<OwnedMutexGuard<T>> {
        self.guard
    }
}
