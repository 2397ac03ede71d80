//! `sqlx::FromRow` row shapes and their conversion into the `aitoys_domain`
//! model types. Rows store enums/JSON blobs as `TEXT`; conversion happens
//! here rather than scattering `serde_json::from_str` across the query
//! modules.

use aitoys_domain::model::{
    AiMetric, AnalysisStatus, ChatMessage, ChatRole, CompressedHistory, CostBreakdown,
    GrowthSummary, OrchestratorState, Session, SummaryStatus, SummaryType,
};
use aitoys_domain::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
pub struct ChatMessageRow {
    pub id: i64,
    pub session_id: String,
    pub agent_id: i64,
    pub role: String,
    pub content: String,
    pub audio_path: Option<String>,
    pub emotion: Option<String>,
    pub copilot_mode: bool,
    pub created_at: String,
}

impl TryFrom<ChatMessageRow> for ChatMessage {
    type Error = Error;

    fn try_from(row: ChatMessageRow) -> Result<Self> {
        Ok(ChatMessage {
            id: row.id,
            session_id: parse_uuid(&row.session_id)?,
            agent_id: row.agent_id,
            role: parse_role(&row.role)?,
            content: row.content,
            audio_path: row.audio_path,
            emotion: row.emotion,
            copilot_mode: row.copilot_mode,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct CompressedHistoryRow {
    pub id: i64,
    pub agent_id: i64,
    pub copilot_mode: bool,
    pub summary: String,
    pub content_last_time: String,
    pub created_at: String,
}

impl TryFrom<CompressedHistoryRow> for CompressedHistory {
    type Error = Error;

    fn try_from(row: CompressedHistoryRow) -> Result<Self> {
        Ok(CompressedHistory {
            id: row.id,
            agent_id: row.agent_id,
            copilot_mode: row.copilot_mode,
            summary: row.summary,
            content_last_time: parse_timestamp(&row.content_last_time)?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub user_id: i64,
    pub agent_id: i64,
    pub copilot_mode: bool,
    pub state: String,
    pub created_at: String,
    pub last_activity_at: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(Session {
            id: parse_uuid(&row.id)?,
            user_id: row.user_id,
            agent_id: row.agent_id,
            copilot_mode: row.copilot_mode,
            state: parse_state(&row.state)?,
            created_at: parse_timestamp(&row.created_at)?,
            last_activity_at: parse_timestamp(&row.last_activity_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct AiMetricRow {
    pub id: i64,
    pub monitor_id: String,
    pub provider: String,
    pub model: String,
    pub session_id: String,
    pub started_at: String,
    pub ended_at: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub input_chars: i64,
    pub output_chars: i64,
    pub tool_call_count: i64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub first_byte_latency_ms: Option<i64>,
    pub first_token_latency_ms: Option<i64>,
    pub total_time_ms: i64,
}

impl TryFrom<AiMetricRow> for AiMetric {
    type Error = Error;

    fn try_from(row: AiMetricRow) -> Result<Self> {
        Ok(AiMetric {
            id: row.id,
            monitor_id: row.monitor_id,
            provider: row.provider,
            model: row.model,
            session_id: parse_uuid(&row.session_id)?,
            started_at: parse_timestamp(&row.started_at)?,
            ended_at: parse_timestamp(&row.ended_at)?,
            input_tokens: row.input_tokens as u32,
            output_tokens: row.output_tokens as u32,
            input_chars: row.input_chars as u32,
            output_chars: row.output_chars as u32,
            tool_call_count: row.tool_call_count as u32,
            cost: CostBreakdown {
                input_cost: row.input_cost,
                output_cost: row.output_cost,
                total_cost: row.total_cost,
            },
            first_byte_latency_ms: row.first_byte_latency_ms.map(|v| v as u32),
            first_token_latency_ms: row.first_token_latency_ms.map(|v| v as u32),
            total_time_ms: row.total_time_ms as u32,
        })
    }
}

#[derive(sqlx::FromRow)]
pub struct GrowthSummaryRow {
    pub id: i64,
    pub agent_id: i64,
    pub summary_date: String,
    pub summary_type: String,
    pub content: Option<String>,
    pub status: String,
    pub scheduled_at: String,
}

impl TryFrom<GrowthSummaryRow> for GrowthSummary {
    type Error = Error;

    fn try_from(row: GrowthSummaryRow) -> Result<Self> {
        Ok(GrowthSummary {
            id: row.id,
            agent_id: row.agent_id,
            summary_date: NaiveDate::parse_from_str(&row.summary_date, "%Y-%m-%d")
                .map_err(|e| Error::Database(e.to_string()))?,
            summary_type: match row.summary_type.as_str() {
                "daily" => SummaryType::Daily,
                "weekly" => SummaryType::Weekly,
                other => return Err(Error::Database(format!("unknown summary_type {other}"))),
            },
            content: row.content,
            status: match row.status.as_str() {
                "pending" => SummaryStatus::Pending,
                "completed" => SummaryStatus::Completed,
                "failed" => SummaryStatus::Failed,
                other => return Err(Error::Database(format!("unknown summary status {other}"))),
            },
            scheduled_at: parse_timestamp(&row.scheduled_at)?,
        })
    }
}

pub fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Database(e.to_string()))
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
        })
        .map_err(|e| Error::Database(e.to_string()))
}

pub fn parse_role(s: &str) -> Result<ChatRole> {
    match s {
        "user" => Ok(ChatRole::User),
        "assistant" => Ok(ChatRole::Assistant),
        other => Err(Error::Database(format!("unknown chat role {other}"))),
    }
}

pub fn parse_state(s: &str) -> Result<OrchestratorState> {
    match s {
        "idle" => Ok(OrchestratorState::Idle),
        "listening" => Ok(OrchestratorState::Listening),
        "thinking" => Ok(OrchestratorState::Thinking),
        "speaking" => Ok(OrchestratorState::Speaking),
        other => Err(Error::Database(format!("unknown orchestrator state {other}"))),
    }
}

pub fn parse_analysis_status(s: &str) -> Result<AnalysisStatus> {
    match s {
        "pending" => Ok(AnalysisStatus::Pending),
        "processing" => Ok(AnalysisStatus::Processing),
        "completed" => Ok(AnalysisStatus::Completed),
        "failed" => Ok(AnalysisStatus::Failed),
        other => Err(Error::Database(format!("unknown analysis status {other}"))),
    }
}
