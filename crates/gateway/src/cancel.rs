//! Per-session cancellation tokens.
//!
//! Barge-in (new audio, text, or an explicit `abort` frame arriving while
//! the orchestrator is `Generating`/`Speaking`) cancels the in-flight LLM
//! and TTS calls for that session. A provider call that does not honour
//! cancellation within the deadline has its eventual result discarded by
//! turn-counter comparison rather than blocked on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    turn: Arc<AtomicU64>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            turn: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Start a fresh turn: clears cancellation and returns the turn id a
    /// late-arriving provider result must match to be accepted.
    pub fn begin_turn(&self) -> u64 {
        self.cancelled.store(false, Ordering::Release);
        self.turn.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current_turn(&self) -> u64 {
        self.turn.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks one `CancelToken` per live session.
pub struct CancelMap {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, session_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(session_id, token.clone());
        token
    }

    pub fn get_or_register(&self, session_id: Uuid) -> CancelToken {
        self.tokens
            .lock()
            .entry(session_id)
            .or_insert_with(CancelToken::new)
            .clone()
    }

    pub fn cancel(&self, session_id: Uuid) -> bool {
        match self.tokens.lock().get(&session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, session_id: Uuid) {
        self.tokens.lock().remove(&session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_turn_clears_cancellation_and_increments_counter() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        let turn = token.begin_turn();
        assert!(!token.is_cancelled());
        assert_eq!(turn, 1);
        assert_eq!(token.begin_turn(), 2);
    }

    #[test]
    fn cancel_map_register_and_cancel() {
        let map = CancelMap::new();
        let id = Uuid::new_v4();
        let token = map.register(id);
        assert!(!token.is_cancelled());
        assert!(map.cancel(id));
        assert!(token.is_cancelled());
        map.remove(id);
        assert!(!map.cancel(id));
    }

    #[test]
    fn get_or_register_reuses_existing_token() {
        let map = CancelMap::new();
        let id = Uuid::new_v4();
        let first = map.get_or_register(id);
        let second = map.get_or_register(id);
        first.cancel();
        assert!(second.is_cancelled());
    }
}
