use serde::{Deserialize, Serialize};

/// One entry in the module registry's startup configuration: a `(type,
/// code)` pair plus the merged config handed to the factory at construct
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRegistrationConfig {
    pub module_type: ModuleType,
    pub code: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Opaque per-module extra config, merged into what the factory sees.
    #[serde(default)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Vad,
    Asr,
    Llm,
    Tts,
    Memory,
    Intent,
}

impl ModuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleType::Vad => "vad",
            ModuleType::Asr => "asr",
            ModuleType::Llm => "llm",
            ModuleType::Tts => "tts",
            ModuleType::Memory => "memory",
            ModuleType::Intent => "intent",
        }
    }

    /// Module types whose default implementation is in-process and needs
    /// no `base_url` (the energy-threshold VAD; the no-op reserved intent
    /// stage).
    pub fn requires_base_url(self) -> bool {
        !matches!(self, ModuleType::Vad | ModuleType::Intent)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the credential; resolved at startup, never
    /// logged (module init-failure surfacing masks it, see trace.rs).
    #[serde(default)]
    pub env: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    QueryParam,
    None,
}

fn d_timeout_ms() -> u64 {
    20_000
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModulesConfig {
    #[serde(default)]
    pub registrations: Vec<ModuleRegistrationConfig>,
}
