//! Generic HTTP TTS module. Synthesized audio is streamed back as raw
//! chunks preserving the wire format the configured provider emits — the
//! gateway forwards it to clients as opaque binary frames.

use std::time::Duration;

use aitoys_domain::config::ModuleRegistrationConfig;
use aitoys_domain::stream::StreamEvent;
use aitoys_domain::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use crate::http_util::{apply_auth, from_reqwest};
use crate::module::{Module, ModuleFactory};

pub struct HttpTtsModule {
    code: String,
    base_url: String,
    auth: aitoys_domain::config::AuthConfig,
    client: reqwest::Client,
}

pub struct HttpTtsFactory;

#[async_trait]
impl ModuleFactory for HttpTtsFactory {
    async fn create(&self, config: &ModuleRegistrationConfig) -> Result<Box<dyn Module>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(from_reqwest)?;
        Ok(Box::new(HttpTtsModule {
            code: config.code.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
            client,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct SynthesizeArgs {
    text: String,
    #[serde(default)]
    voice_id: Option<String>,
}

#[async_trait]
impl Module for HttpTtsModule {
    fn name(&self) -> &str {
        &self.code
    }

    fn description(&self) -> &str {
        "HTTP text-to-speech module"
    }

    async fn call(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        if tool_name != "synthesize" {
            return Err(Error::Protocol(format!("unsupported tool {tool_name}")));
        }
        let args: SynthesizeArgs = serde_json::from_value(arguments)?;
        let url = format!("{}/synthesize", self.base_url);
        let req = apply_auth(self.client.post(&url), &self.auth)?;
        let resp = req
            .json(&serde_json::json!({ "text": args.text, "voice_id": args.voice_id }))
            .send()
            .await
            .map_err(from_reqwest)?;
        if !resp.status().is_success() {
            let retriable = resp.status().is_server_error();
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Module {
                module: "tts".into(),
                message: format!("http {status}: {text}"),
                retriable,
            });
        }
        let bytes = resp.bytes().await.map_err(from_reqwest)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(serde_json::json!({ "audio_base64": encoded }))
    }

    async fn call_stream(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        if tool_name != "synthesize" {
            return Err(Error::Protocol(format!("unsupported tool {tool_name}")));
        }
        let args: SynthesizeArgs = serde_json::from_value(arguments)?;
        let url = format!("{}/synthesize/stream", self.base_url);
        let req = apply_auth(self.client.post(&url), &self.auth)?;
        let resp = req
            .json(&serde_json::json!({ "text": args.text, "voice_id": args.voice_id }))
            .send()
            .await
            .map_err(from_reqwest)?;
        if !resp.status().is_success() {
            let retriable = resp.status().is_server_error();
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Module {
                module: "tts".into(),
                message: format!("http {status}: {text}"),
                retriable,
            });
        }

        let stream = async_stream::stream! {
            let mut body = resp.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => yield Ok(StreamEvent::Audio { data: bytes.to_vec() }),
                    Err(e) => {
                        yield Err(from_reqwest(e));
                        return;
                    }
                }
            }
            yield Ok(StreamEvent::Done { usage: None });
        };
        Ok(Box::pin(stream))
    }
}
