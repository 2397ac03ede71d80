//! Reserved module type: the registry can construct and dispatch `intent`
//! modules, but the orchestrator never invokes one in the VAD→ASR→LLM→TTS
//! path. Kept as a registrable no-op so the `(type, code)` contract holds
//! uniformly across all six module types ahead of a future pre-LLM
//! routing stage.

use aitoys_domain::config::ModuleRegistrationConfig;
use aitoys_domain::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::module::{Module, ModuleFactory};

pub struct NoopIntentModule {
    code: String,
}

pub struct NoopIntentFactory;

#[async_trait]
impl ModuleFactory for NoopIntentFactory {
    async fn create(&self, config: &ModuleRegistrationConfig) -> Result<Box<dyn Module>> {
        Ok(Box::new(NoopIntentModule {
            code: config.code.clone(),
        }))
    }
}

#[async_trait]
impl Module for NoopIntentModule {
    fn name(&self) -> &str {
        &self.code
    }

    fn description(&self) -> &str {
        "reserved intent-routing module (not yet invoked by the orchestrator)"
    }

    async fn call(&self, _tool_name: &str, _arguments: Value) -> Result<Value> {
        Ok(serde_json::json!({ "intent": null }))
    }
}
