use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    /// Deadline for the hello handshake (§4.5) before the connection is
    /// dropped without a welcome frame.
    #[serde(default = "d_hello_timeout_ms")]
    pub hello_timeout_ms: u64,
    /// Env var holding the bearer token websocket and legacy HTTP clients
    /// authenticate with. Unset means the gateway runs with auth disabled
    /// (dev mode) rather than falling back to an in-config secret.
    #[serde(default = "d_token_env")]
    pub token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            cors: CorsConfig::default(),
            rate_limit: None,
            hello_timeout_ms: d_hello_timeout_ms(),
            token_env: d_token_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

fn d_port() -> u16 {
    8420
}
fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()]
}
fn d_hello_timeout_ms() -> u64 {
    5_000
}
fn d_token_env() -> String {
    "AITOYS_API_TOKEN".into()
}
