//! Per-session concurrency control.
//!
//! Ensures at most one generation runs per session at a time (the
//! at-most-one-generation invariant). A second input arriving while a
//! turn is in-flight either queues (capacity 1, collapsing to latest) or
//! is rejected with `busy_dropped` — decided by the orchestrator, not
//! this map.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

pub struct SessionLockMap {
    locks: Mutex<HashMap<Uuid, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Try to acquire the run lock without waiting — used for the
    /// at-most-one-generation check, where a busy session should drop the
    /// new input rather than queue behind the map's own wait.
    pub fn try_acquire(&self, session_id: Uuid) -> Option<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id)
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().ok()
    }

    pub async fn acquire(&self, session_id: Uuid) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id)
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned()
            .await
            .expect("session lock semaphore is never closed")
    }

    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Remove locks for sessions with no in-flight turn (periodic sweep).
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequential_access_on_same_session() {
        let map = SessionLockMap::new();
        let id = Uuid::new_v4();
        let permit1 = map.acquire(id).await;
        drop(permit1);
        let permit2 = map.acquire(id).await;
        drop(permit2);
    }

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let map = SessionLockMap::new();
        let id = Uuid::new_v4();
        let _permit = map.acquire(id).await;
        assert!(map.try_acquire(id).is_none());
    }

    #[tokio::test]
    async fn different_sessions_are_independent() {
        let map = SessionLockMap::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let p1 = map.acquire(a).await;
        let p2 = map.acquire(b).await;
        assert_eq!(map.session_count(), 2);
        drop(p1);
        drop(p2);
    }
}
