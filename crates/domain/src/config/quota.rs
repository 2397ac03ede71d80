use serde::{Deserialize, Serialize};

/// Per-user/per-agent daily spend and call-count ceilings enforced by the
/// metrics recorder's in-memory quota cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "d_daily_calls")]
    pub max_daily_calls_per_agent: u32,
    #[serde(default = "d_daily_cost")]
    pub max_daily_cost_usd_per_agent: f64,
    #[serde(default = "d_max_session_secs")]
    pub max_session_duration_secs: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_daily_calls_per_agent: d_daily_calls(),
            max_daily_cost_usd_per_agent: d_daily_cost(),
            max_session_duration_secs: d_max_session_secs(),
        }
    }
}

fn d_daily_calls() -> u32 {
    2_000
}
fn d_daily_cost() -> f64 {
    5.0
}
fn d_max_session_secs() -> u32 {
    3_600
}
