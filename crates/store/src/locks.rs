//! Keyed advisory locking for store-level operations that must not run
//! concurrently for the same key, such as compacting the same
//! (agent, copilot_mode) history range from two sessions at once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One `Semaphore(1)` per key. Acquiring the permit grants exclusive
/// access to whatever the caller associates with that key; it auto-releases
/// on drop.
pub struct KeyedLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for KeyedLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyedLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, key: &str) -> OwnedSemaphorePermit {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned()
            .await
            .expect("lock semaphore is never closed")
    }

    /// Non-blocking variant: `None` if the key is currently held.
    pub fn try_acquire(&self, key: &str) -> Option<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().ok()
    }

    pub fn key_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop tracking entries for keys that aren't currently held.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// Builds the advisory lock key for a conversation's (agent, copilot_mode)
/// compaction range — the unit `compactIfNeeded` must serialize on.
pub fn compaction_key(agent_id: i64, copilot_mode: bool) -> String {
    format!("compact:{agent_id}:{copilot_mode}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn same_key_serializes() {
        let map = KeyedLockMap::new();
        let p1 = map.acquire("a").await;
        assert!(map.try_acquire("a").is_none());
        drop(p1);
        assert!(map.try_acquire("a").is_some());
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let map = KeyedLockMap::new();
        let p1 = map.acquire("a").await;
        let p2 = map.acquire("b").await;
        assert_eq!(map.key_count(), 2);
        drop(p1);
        drop(p2);
    }

    #[tokio::test]
    async fn second_waiter_proceeds_after_release() {
        let map = StdArc::new(KeyedLockMap::new());
        let map2 = map.clone();
        let p1 = map.acquire("s1").await;

        let handle = tokio::spawn(async move {
            let _p2 = map2.acquire("s1").await;
            7
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(p1);
        assert_eq!(handle.await.unwrap(), 7);
    }

    #[test]
    fn compaction_key_distinguishes_copilot_mode() {
        assert_ne!(compaction_key(1, true), compaction_key(1, false));
    }
}
