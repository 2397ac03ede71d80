//! Memory module: a pluggable long-term memory provider, orthogonal to the
//! conversation store's own `memory_data` blob on `AgentInstance`. Answers
//! `"recall"` (retrieve relevant memory fragments for a prompt) and
//! `"remember"` (persist a new fragment) against a provider endpoint.

use std::time::Duration;

use aitoys_domain::config::ModuleRegistrationConfig;
use aitoys_domain::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::http_util::{apply_auth, from_reqwest};
use crate::module::{Module, ModuleFactory};

pub struct HttpMemoryModule {
    code: String,
    base_url: String,
    auth: aitoys_domain::config::AuthConfig,
    client: reqwest::Client,
}

pub struct HttpMemoryFactory;

#[async_trait]
impl ModuleFactory for HttpMemoryFactory {
    async fn create(&self, config: &ModuleRegistrationConfig) -> Result<Box<dyn Module>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(from_reqwest)?;
        Ok(Box::new(HttpMemoryModule {
            code: config.code.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
            client,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct RecallArgs {
    query: String,
    #[serde(default = "d_limit")]
    limit: u32,
}

fn d_limit() -> u32 {
    5
}

#[derive(Debug, Deserialize)]
struct RememberArgs {
    fragment: String,
}

#[async_trait]
impl Module for HttpMemoryModule {
    fn name(&self) -> &str {
        &self.code
    }

    fn description(&self) -> &str {
        "long-term memory recall/remember module"
    }

    async fn call(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        match tool_name {
            "recall" => {
                let args: RecallArgs = serde_json::from_value(arguments)?;
                let url = format!("{}/recall", self.base_url);
                let req = apply_auth(self.client.post(&url), &self.auth)?;
                let resp = req
                    .json(&serde_json::json!({ "query": args.query, "limit": args.limit }))
                    .send()
                    .await
                    .map_err(from_reqwest)?;
                let body: Value = resp.json().await.map_err(from_reqwest)?;
                Ok(body)
            }
            "remember" => {
                let args: RememberArgs = serde_json::from_value(arguments)?;
                let url = format!("{}/remember", self.base_url);
                let req = apply_auth(self.client.post(&url), &self.auth)?;
                req.json(&serde_json::json!({ "fragment": args.fragment }))
                    .send()
                    .await
                    .map_err(from_reqwest)?;
                Ok(serde_json::json!({ "ok": true }))
            }
            other => Err(Error::Protocol(format!("unsupported tool {other}"))),
        }
    }
}
