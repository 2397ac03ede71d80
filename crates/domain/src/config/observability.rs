use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "d_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    /// OTLP collector endpoint. When unset, the tracing-opentelemetry
    /// layer is not installed and spans stay local to `tracing`.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "d_service_name")]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: d_log_level(),
            log_json: false,
            otlp_endpoint: None,
            service_name: d_service_name(),
        }
    }
}

fn d_log_level() -> String {
    "info".into()
}
fn d_service_name() -> String {
    "aitoys-gateway".into()
}
