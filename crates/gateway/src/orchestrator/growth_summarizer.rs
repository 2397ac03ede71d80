//! Drives the periodic growth-summary rollups through whatever LLM module
//! the agent has configured, the same way `ModuleSummarizer` drives
//! conversation compaction.

use std::sync::Arc;

use aitoys_domain::config::ModuleType;
use aitoys_domain::model::SummaryType;
use aitoys_domain::tool::Message;
use aitoys_domain::{Error, Result};
use aitoys_modules::registry::ModuleRegistry;
use aitoys_store::{AgentStore, ConversationStore, GrowthSummarizer};
use async_trait::async_trait;
use chrono::NaiveDate;

pub struct ModuleGrowthSummarizer {
    pub agents: Arc<AgentStore>,
    pub modules: Arc<ModuleRegistry>,
    pub conversations: Arc<ConversationStore>,
}

#[async_trait]
impl GrowthSummarizer for ModuleGrowthSummarizer {
    async fn summarize(&self, agent_id: i64, date: NaiveDate, summary_type: SummaryType) -> Result<String> {
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or_else(|| Error::Config(format!("unknown agent {agent_id}")))?;

        let llm_selection = agent
            .module_params
            .llm
            .as_ref()
            .ok_or_else(|| Error::Config(format!("agent {agent_id} has no llm module configured")))?;
        let llm = self
            .modules
            .get(ModuleType::Llm, &llm_selection.code)
            .ok_or_else(|| Error::Config(format!("llm module {} not registered", llm_selection.code)))?;

        let window = self.conversations.recent_window(agent_id, false, 200).await?;
        let period = match summary_type {
            SummaryType::Daily => "day",
            SummaryType::Weekly => "week",
        };

        let mut messages = vec![Message::system(format!(
            "Write a short growth summary of what the child learned, talked about, and practiced over the past {period} ({date}), based on the conversation below. Two or three sentences, written for a parent."
        ))];
        if let Some(summary) = &window.compressed_summary {
            messages.push(Message::system(format!("Earlier context: {summary}")));
        }
        for m in &window.messages {
            match m.role {
                aitoys_domain::model::ChatRole::User => messages.push(Message::user(m.content.clone())),
                aitoys_domain::model::ChatRole::Assistant => messages.push(Message::assistant(m.content.clone())),
            }
        }

        let result = llm.call("chat", serde_json::json!({ "messages": messages })).await?;
        Ok(result
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}
