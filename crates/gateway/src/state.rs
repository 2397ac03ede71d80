//! Shared application state, assembled once in `bootstrap::build_app_state`
//! and cloned into every request/connection handler.

use std::sync::Arc;

use aitoys_domain::config::Config;
use aitoys_modules::metrics::MetricsRecorder;
use aitoys_modules::pricing::PricingTable;
use aitoys_modules::registry::ModuleRegistry;
use aitoys_store::{AgentStore, AnalysisStore, ConversationStore, GrowthStore, MetricsStore, SessionStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::cancel::CancelMap;
use crate::orchestrator::audio_archive::AudioArchive;
use crate::orchestrator::OrchestratorDeps;
use crate::session_lock::SessionLockMap;

struct LiveConnection {
    session_id: Uuid,
    kill: oneshot::Sender<()>,
}

/// Tracks the live connection for each `client_id`, so a reconnect can
/// supplant (and cleanly close) whatever socket currently holds that id
/// instead of running two connections for the same client side by side,
/// and so the new connection can resume the same `session_id`.
#[derive(Default)]
pub struct ConnectionRegistry {
    live: Mutex<HashMap<Uuid, LiveConnection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `session_id` of whatever connection currently holds
    /// `client_id`, if any — the new connection resumes it instead of
    /// minting a fresh one.
    pub fn resumable_session(&self, client_id: Uuid) -> Option<Uuid> {
        self.live.lock().get(&client_id).map(|c| c.session_id)
    }

    /// Registers the new connection under `client_id` as the owner of
    /// `session_id`, signalling and evicting whichever connection
    /// previously held it (its `session_id` is the same one if this is a
    /// resume, a different one if `client_id` was reused for a fresh
    /// session while the old connection was still technically alive).
    pub fn attach(&self, client_id: Uuid, session_id: Uuid, kill: oneshot::Sender<()>) {
        let previous = self
            .live
            .lock()
            .insert(client_id, LiveConnection { session_id, kill });
        if let Some(previous) = previous {
            let _ = previous.kill.send(());
        }
    }

    /// Removes the registration, but only if it still belongs to
    /// `session_id` — a later reconnect may have already replaced it.
    pub fn detach(&self, client_id: Uuid, session_id: Uuid) {
        let mut live = self.live.lock();
        if live.get(&client_id).is_some_and(|c| c.session_id == session_id) {
            live.remove(&client_id);
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub conversations: Arc<ConversationStore>,
    pub sessions: Arc<SessionStore>,
    pub agents: Arc<AgentStore>,
    pub growth: Arc<GrowthStore>,
    pub analysis: Arc<AnalysisStore>,
    pub metrics_store: Arc<MetricsStore>,

    pub modules: Arc<ModuleRegistry>,
    pub cancels: Arc<CancelMap>,
    pub locks: Arc<SessionLockMap>,
    pub metrics: Arc<MetricsRecorder>,
    pub pricing: Arc<PricingTable>,
    pub audio_archive: Arc<AudioArchive>,

    pub connections: Arc<ConnectionRegistry>,

    /// `None` when the gateway is running with auth disabled (no
    /// `config.server.token_env` value set in the environment).
    pub api_token_hash: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resumable_session_is_none_for_a_fresh_client_id() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.resumable_session(Uuid::new_v4()), None);
    }

    #[test]
    fn attach_then_resumable_session_round_trips() {
        let registry = ConnectionRegistry::new();
        let client_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let (kill_tx, _kill_rx) = oneshot::channel();

        registry.attach(client_id, session_id, kill_tx);

        assert_eq!(registry.resumable_session(client_id), Some(session_id));
    }

    #[test]
    fn attaching_over_an_existing_client_id_kills_the_previous_connection() {
        let registry = ConnectionRegistry::new();
        let client_id = Uuid::new_v4();
        let (first_kill_tx, mut first_kill_rx) = oneshot::channel();
        let (second_kill_tx, _second_kill_rx) = oneshot::channel();

        registry.attach(client_id, Uuid::new_v4(), first_kill_tx);
        registry.attach(client_id, Uuid::new_v4(), second_kill_tx);

        assert!(first_kill_rx.try_recv().is_ok());
    }

    #[test]
    fn detach_removes_only_if_session_id_still_matches() {
        let registry = ConnectionRegistry::new();
        let client_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let (kill_tx, _kill_rx) = oneshot::channel();
        registry.attach(client_id, session_id, kill_tx);

        // A stale session_id (e.g. from a connection that already got
        // supplanted) must not evict the current registration.
        registry.detach(client_id, Uuid::new_v4());
        assert_eq!(registry.resumable_session(client_id), Some(session_id));

        registry.detach(client_id, session_id);
        assert_eq!(registry.resumable_session(client_id), None);
    }
}

impl AppState {
    /// Bundles the fields `SessionOrchestrator` needs into the smaller
    /// dependency struct it actually takes, so callers don't have to
    /// thread `AppState` itself into orchestrator construction.
    pub fn orchestrator_deps(&self) -> Arc<OrchestratorDeps> {
        Arc::new(OrchestratorDeps {
            conversations: self.conversations.clone(),
            sessions: self.sessions.clone(),
            agents: self.agents.clone(),
            modules: self.modules.clone(),
            cancels: self.cancels.clone(),
            locks: self.locks.clone(),
            metrics: self.metrics.clone(),
            pricing: self.pricing.clone(),
            audio_archive: self.audio_archive.clone(),
            analysis: self.analysis.clone(),
            compaction_threshold: self.config.store.compaction_message_threshold,
        })
    }
}
