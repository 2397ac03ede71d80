//! Assembles every subsystem into one `AppState` and spawns the
//! background workers that keep it healthy once the server is serving
//! traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aitoys_domain::config::{Config, ConfigSeverity, ModuleType};
use aitoys_domain::model::SummaryType;
use aitoys_modules::asr::HttpAsrFactory;
use aitoys_modules::intent::NoopIntentFactory;
use aitoys_modules::llm::OpenAiCompatLlmFactory;
use aitoys_modules::memory::HttpMemoryFactory;
use aitoys_modules::metrics::MetricsRecorder;
use aitoys_modules::module::ModuleFactory;
use aitoys_modules::pricing::PricingTable;
use aitoys_modules::registry::ModuleRegistry;
use aitoys_modules::tts::HttpTtsFactory;
use aitoys_modules::vad::EnergyThresholdVadFactory;
use aitoys_store::{AgentStore, AnalysisStore, ConversationStore, GrowthStore, MetricsStore, SessionStore, StorePool};

use crate::auth::hash_token;
use crate::cancel::CancelMap;
use crate::orchestrator::audio_archive::{default_root, AudioArchive};
use crate::session_lock::SessionLockMap;
use crate::state::{AppState, ConnectionRegistry};

/// Builds every subsystem exactly once. Aborts on `ConfigSeverity::Error`
/// findings; warnings are logged and otherwise ignored.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    let mut hard_error = false;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Error => {
                hard_error = true;
                tracing::error!(field = %issue.field, message = %issue.message, "config error");
            }
            ConfigSeverity::Warning => {
                tracing::warn!(field = %issue.field, message = %issue.message, "config warning");
            }
        }
    }
    if hard_error {
        anyhow::bail!("refusing to start with invalid configuration, see logged errors above");
    }

    let pool = StorePool::connect(&config.store).await?;
    tracing::info!(database_url = %config.store.database_url, "store pool connected, migrations applied");

    let conversations = Arc::new(ConversationStore::new(pool.clone()));
    let sessions = Arc::new(SessionStore::new(pool.clone()));
    let agents = Arc::new(AgentStore::new(pool.clone()));
    let growth = Arc::new(GrowthStore::new(pool.clone()));
    let analysis = Arc::new(AnalysisStore::new(pool.clone()));
    let metrics_store = Arc::new(MetricsStore::new(pool.clone()));

    let factories = build_module_factories();
    let modules = Arc::new(ModuleRegistry::build(&config.modules, &factories).await);
    tracing::info!(
        modules = modules.len(),
        init_errors = modules.init_errors().len(),
        "module registry built"
    );

    let cancels = Arc::new(CancelMap::new());
    let locks = Arc::new(SessionLockMap::new());
    let metrics = Arc::new(MetricsRecorder::new(
        config.quota.max_daily_calls_per_agent,
        config.quota.max_daily_cost_usd_per_agent,
    ));
    let pricing = Arc::new(PricingTable::default());
    let audio_archive = Arc::new(AudioArchive::new(default_root()));

    let api_token_hash = std::env::var(&config.server.token_env)
        .ok()
        .filter(|t| !t.is_empty())
        .map(|t| hash_token(&t));
    tracing::info!(
        auth_enabled = api_token_hash.is_some(),
        token_env = %config.server.token_env,
        "api auth configured"
    );

    Ok(AppState {
        config,
        conversations,
        sessions,
        agents,
        growth,
        analysis,
        metrics_store,
        modules,
        cancels,
        locks,
        metrics,
        pricing,
        audio_archive,
        connections: Arc::new(ConnectionRegistry::new()),
        api_token_hash,
    })
}

fn build_module_factories() -> HashMap<ModuleType, Arc<dyn ModuleFactory>> {
    let mut factories: HashMap<ModuleType, Arc<dyn ModuleFactory>> = HashMap::new();
    factories.insert(ModuleType::Vad, Arc::new(EnergyThresholdVadFactory));
    factories.insert(ModuleType::Asr, Arc::new(HttpAsrFactory));
    factories.insert(ModuleType::Llm, Arc::new(OpenAiCompatLlmFactory));
    factories.insert(ModuleType::Tts, Arc::new(HttpTtsFactory));
    factories.insert(ModuleType::Memory, Arc::new(HttpMemoryFactory));
    factories.insert(ModuleType::Intent, Arc::new(NoopIntentFactory));
    factories
}

/// Spawns the periodic maintenance tasks. Each failure is logged and
/// retried on the next tick rather than propagated, since none of these
/// are on the hot path of a live connection.
pub fn spawn_background_tasks(state: &AppState) {
    spawn_metrics_flush(state);
    spawn_growth_scheduler(state);
    spawn_idle_pruner(state);
}

fn spawn_metrics_flush(state: &AppState) {
    let metrics_store = state.metrics_store.clone();
    let metrics = state.metrics.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            // `agent_id` here is only a logging hint for MetricsStore::flush;
            // the recorder buffers across all agents in one queue.
            if let Err(e) = metrics_store.flush(0, &metrics).await {
                tracing::warn!(error = %e, "metrics flush failed, will retry next tick");
            }
        }
    });
}

fn spawn_growth_scheduler(state: &AppState) {
    let growth = state.growth.clone();
    let agents = state.agents.clone();
    let modules = state.modules.clone();
    let conversations = state.conversations.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(e) = trigger_due_daily_summaries(&agents, &growth).await {
                tracing::warn!(error = %e, "daily growth summary trigger tick failed");
            }

            let summarizer = crate::orchestrator::growth_summarizer::ModuleGrowthSummarizer {
                agents: agents.clone(),
                modules: modules.clone(),
                conversations: conversations.clone(),
            };
            match growth.run_pending(&summarizer, 20).await {
                Ok(n) if n > 0 => tracing::info!(processed = n, "growth summaries processed"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "growth scheduler tick failed"),
            }
        }
    });
}

/// Scans every agent and enqueues its daily growth summary once the clock
/// passes its configured `function_settings.daily_summary_time`
/// (`"HH:MM"`, UTC). `GrowthStore::schedule` is idempotent per
/// (agent, date, type), so ticking past the same minute more than once a
/// day is harmless.
async fn trigger_due_daily_summaries(agents: &Arc<AgentStore>, growth: &Arc<GrowthStore>) -> anyhow::Result<()> {
    let now = chrono::Utc::now();
    let current_hhmm = now.format("%H:%M").to_string();

    for agent_id in agents.list_ids().await? {
        let agent = match agents.get(agent_id).await {
            Ok(Some(agent)) => agent,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(agent_id, error = %e, "daily summary trigger: agent lookup failed");
                continue;
            }
        };
        let Some(configured) = agent.agent_config.function_settings.daily_summary_time.as_deref() else {
            continue;
        };
        if configured != current_hhmm {
            continue;
        }
        if let Err(e) = growth
            .schedule(agent_id, now.date_naive(), SummaryType::Daily, now)
            .await
        {
            tracing::warn!(agent_id, error = %e, "failed to schedule daily growth summary");
        }
    }
    Ok(())
}

fn spawn_idle_pruner(state: &AppState) {
    let locks = state.locks.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let before = locks.session_count();
            locks.prune_idle();
            let after = locks.session_count();
            if after < before {
                tracing::debug!(pruned = before - after, "pruned idle session locks");
            }
        }
    });
}
