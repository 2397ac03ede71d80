use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login_name: String,
    pub login_type: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub profile: serde_json::Value,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Speaker,
    Display,
    Robot,
    Vehicle,
    Wearable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTelemetry {
    pub battery_pct: Option<u8>,
    pub charging: Option<bool>,
    pub volume: Option<u8>,
    pub brightness: Option<u8>,
    pub wifi_rssi: Option<i16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub device_type: DeviceType,
    pub telemetry: DeviceTelemetry,
    pub online: bool,
    pub last_active_at: Option<DateTime<Utc>>,
    /// Short-lived bind-handshake challenge; `None` once bound.
    pub challenge: Option<String>,
}

/// A device<->user ownership join row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceOwnership {
    pub device_id: Uuid,
    pub user_id: i64,
    pub is_owner: bool,
}

/// Which module code to use for each pluggable surface, plus its
/// per-module configuration blob. Keys are the `ModuleKind` wire names
/// (`vad`, `asr`, `llm`, `tts`, `memory`, `intent`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleParams {
    #[serde(default)]
    pub vad: Option<ModuleSelection>,
    #[serde(default)]
    pub asr: Option<ModuleSelection>,
    #[serde(default)]
    pub llm: Option<ModuleSelection>,
    #[serde(default)]
    pub tts: Option<ModuleSelection>,
    #[serde(default)]
    pub memory: Option<ModuleSelection>,
    #[serde(default)]
    pub intent: Option<ModuleSelection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSelection {
    pub code: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterSettings {
    pub name: Option<String>,
    pub persona_prompt: Option<String>,
    pub child_info: Option<ChildInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChildInfo {
    pub nickname: Option<String>,
    pub age_years: Option<u8>,
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioSettings {
    pub voice_id: Option<String>,
    pub speaking_rate: Option<f32>,
    pub vad_confidence_threshold: Option<[f32; 2]>,
    /// How the orchestrator decides an utterance has ended: `manual`
    /// (client-driven `listen:start`/`listen:stop`), `auto` (VAD
    /// hysteresis), or `realtime` (stream every frame to ASR).
    pub listen_mode: Option<String>,
    /// Single-value VAD activation threshold, used as the hysteresis high
    /// watermark when `vad_confidence_threshold` is unset.
    pub vad_threshold: Option<f32>,
    /// Seconds of sustained silence before the VAD gate finalizes an
    /// utterance.
    pub silence_timeout: Option<u32>,
    /// Below this many seconds of buffered audio, a finalized utterance is
    /// discarded as noise rather than sent to ASR.
    pub min_recording_duration: Option<u32>,
    /// Forces finalization once buffered audio reaches this many seconds,
    /// regardless of VAD state.
    pub max_recording_duration: Option<u32>,
    /// Seconds without audio or text before an idle connection is closed.
    pub close_connection_no_voice_time: Option<u32>,
    #[serde(default)]
    pub enable_baby_talk_mode: bool,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionSettings {
    #[serde(default)]
    pub tools_enabled: Vec<String>,
    #[serde(default)]
    pub memory_enabled: bool,
    #[serde(default)]
    pub intent_enabled: bool,
    pub chat_language: Option<String>,
    pub chat_voice_speed: Option<f32>,
    pub chat_control_language: Option<String>,
    pub chat_control_voice_speed: Option<f32>,
    pub chat_control_play_music: Option<bool>,
    pub chat_control_switch_role: Option<bool>,
    #[serde(default)]
    pub enable_user_clone_voice: bool,
    #[serde(default)]
    pub enable_opening_say_hello: bool,
    /// Wall-clock `HH:MM` (UTC) at which a daily growth summary is due.
    pub daily_summary_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareSettings {
    pub target_device_type: Option<DeviceType>,
    pub max_recording_secs: Option<u32>,
    pub volume: Option<u8>,
    pub light_brightness: Option<u8>,
    pub light_color: Option<String>,
    pub light_mode: Option<String>,
    pub auto_brightness: Option<bool>,
    pub night_mode: Option<bool>,
    pub volume_limit: Option<u8>,
}

/// The nested character/audio/function/hardware configuration blob owned
/// by a template and inheritable/overridable by an instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub character: CharacterSettings,
    #[serde(default)]
    pub audio_settings: AudioSettings,
    #[serde(default)]
    pub function_settings: FunctionSettings,
    #[serde(default)]
    pub hardware_settings: HardwareSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTemplate {
    pub id: i64,
    pub name: String,
    pub avatar_url: Option<String>,
    pub target_device_type: DeviceType,
    pub module_params: ModuleParams,
    pub agent_config: AgentConfig,
    /// `0` denotes a system template.
    pub creator_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInstance {
    pub id: i64,
    pub template_id: i64,
    pub owner_user_id: i64,
    pub bound_device_id: Option<Uuid>,
    pub module_params: ModuleParams,
    pub agent_config: AgentConfig,
    pub memory_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Listening,
    Thinking,
    Speaking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: i64,
    pub agent_id: i64,
    pub copilot_mode: bool,
    pub state: OrchestratorState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: Uuid,
    pub agent_id: i64,
    pub role: ChatRole,
    pub content: String,
    /// Present only for user messages that originated from recorded audio.
    pub audio_path: Option<String>,
    pub emotion: Option<String>,
    pub copilot_mode: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedHistory {
    pub id: i64,
    pub agent_id: i64,
    pub copilot_mode: bool,
    pub summary: String,
    /// Messages at or before this timestamp are covered by `summary`.
    pub content_last_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAnalysis {
    pub id: i64,
    pub session_id: Uuid,
    pub duration_secs: u32,
    pub avg_child_utterance_len: f32,
    pub analysis: serde_json::Value,
    pub status: AnalysisStatus,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiMetric {
    pub id: i64,
    pub monitor_id: String,
    pub provider: String,
    pub model: String,
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub input_chars: u32,
    pub output_chars: u32,
    pub tool_call_count: u32,
    pub cost: CostBreakdown,
    pub first_byte_latency_ms: Option<u32>,
    pub first_token_latency_ms: Option<u32>,
    pub total_time_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceCloneStatus {
    Training,
    Available,
    Failed,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceClone {
    pub id: i64,
    pub owner_user_id: i64,
    pub provider_speaker_id: Option<String>,
    pub status: VoiceCloneStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthSummary {
    pub id: i64,
    pub agent_id: i64,
    pub summary_date: chrono::NaiveDate,
    pub summary_type: SummaryType,
    pub content: Option<String>,
    pub status: SummaryStatus,
    pub scheduled_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_params_defaults_to_all_unset() {
        let params: ModuleParams = serde_json::from_str("{}").unwrap();
        assert!(params.vad.is_none());
        assert!(params.llm.is_none());
    }

    #[test]
    fn agent_config_round_trips_nested_settings() {
        let cfg = AgentConfig {
            character: CharacterSettings {
                name: Some("Buddy".into()),
                persona_prompt: Some("You are a friendly companion.".into()),
                child_info: Some(ChildInfo {
                    nickname: Some("Sam".into()),
                    age_years: Some(6),
                    interests: vec!["dinosaurs".into()],
                }),
            },
            audio_settings: AudioSettings {
                voice_id: Some("warm-1".into()),
                speaking_rate: Some(1.0),
                vad_confidence_threshold: Some([0.6, 0.3]),
                listen_mode: Some("auto".into()),
                vad_threshold: Some(0.6),
                silence_timeout: Some(2),
                min_recording_duration: Some(1),
                max_recording_duration: Some(30),
                close_connection_no_voice_time: Some(300),
                enable_baby_talk_mode: false,
                language: Some("en-US".into()),
            },
            function_settings: FunctionSettings {
                tools_enabled: vec!["weather".into()],
                memory_enabled: true,
                intent_enabled: false,
                chat_language: Some("en-US".into()),
                chat_voice_speed: Some(1.0),
                chat_control_language: None,
                chat_control_voice_speed: None,
                chat_control_play_music: Some(true),
                chat_control_switch_role: Some(false),
                enable_user_clone_voice: false,
                enable_opening_say_hello: true,
                daily_summary_time: Some("21:00".into()),
            },
            hardware_settings: HardwareSettings {
                target_device_type: Some(DeviceType::Robot),
                max_recording_secs: Some(30),
                volume: Some(70),
                light_brightness: Some(80),
                light_color: Some("warm-white".into()),
                light_mode: Some("breathing".into()),
                auto_brightness: Some(true),
                night_mode: Some(false),
                volume_limit: Some(90),
            },
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.character.name.as_deref(), Some("Buddy"));
        assert_eq!(back.audio_settings.vad_confidence_threshold, Some([0.6, 0.3]));
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = User {
            id: 1,
            login_name: "a".into(),
            login_type: "password".into(),
            display_name: "A".into(),
            password_hash: "super-secret-hash".into(),
            profile: serde_json::json!({}),
            status: UserStatus::Active,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("super-secret-hash"));
    }
}
