use serde::{Deserialize, Serialize};

/// Admin/HTTP-CRUD bearer token source. If the named env var is unset,
/// admin endpoints are disabled (403) rather than falling back to an
/// in-config secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "d_token_env")]
    pub token_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            token_env: d_token_env(),
        }
    }
}

fn d_token_env() -> String {
    "AITOYS_ADMIN_TOKEN".into()
}
