//! Generic HTTP ASR module. Audio is opaque binary passthrough — this
//! adapter base64-encodes the frame, posts it to the configured endpoint,
//! and relays whatever transcript text comes back. Provider-specific
//! decoding, if any, happens on the far side of `base_url`.

use std::time::Duration;

use aitoys_domain::config::ModuleRegistrationConfig;
use aitoys_domain::stream::StreamEvent;
use aitoys_domain::{Error, Result};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use serde::Deserialize;
use serde_json::Value;

use crate::http_util::{apply_auth, from_reqwest};
use crate::module::{Module, ModuleFactory};

pub struct HttpAsrModule {
    code: String,
    base_url: String,
    auth: aitoys_domain::config::AuthConfig,
    client: reqwest::Client,
}

pub struct HttpAsrFactory;

#[async_trait]
impl ModuleFactory for HttpAsrFactory {
    async fn create(&self, config: &ModuleRegistrationConfig) -> Result<Box<dyn Module>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(from_reqwest)?;
        Ok(Box::new(HttpAsrModule {
            code: config.code.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
            client,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct TranscribeArgs {
    audio_base64: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

#[async_trait]
impl Module for HttpAsrModule {
    fn name(&self) -> &str {
        &self.code
    }

    fn description(&self) -> &str {
        "HTTP speech-to-text module"
    }

    async fn call(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        if tool_name != "transcribe" {
            return Err(Error::Protocol(format!("unsupported tool {tool_name}")));
        }
        let args: TranscribeArgs = serde_json::from_value(arguments)?;
        let url = format!("{}/transcribe", self.base_url);
        let req = apply_auth(self.client.post(&url), &self.auth)?;
        let resp = req
            .json(&serde_json::json!({
                "audio": args.audio_base64,
                "language": args.language,
            }))
            .send()
            .await
            .map_err(from_reqwest)?;
        if !resp.status().is_success() {
            let retriable = resp.status().is_server_error();
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Module {
                module: "asr".into(),
                message: format!("http {status}: {text}"),
                retriable,
            });
        }
        let parsed: TranscribeResponse = resp.json().await.map_err(from_reqwest)?;
        Ok(serde_json::json!({ "text": parsed.text }))
    }

    async fn call_stream(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        // Interim streaming transcription is not implemented by this
        // adapter; fall back to the default one-shot-stream wrapper around
        // the blocking call, surfacing the final transcript as one chunk.
        let result = self.call(tool_name, arguments).await;
        let stream = async_stream::stream! {
            match result {
                Ok(value) => {
                    let text = value.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    yield Ok(StreamEvent::FinalTranscript { text });
                    yield Ok(StreamEvent::Done { usage: None });
                }
                Err(e) => {
                    let kind = e.kind();
                    yield Ok(StreamEvent::Error {
                        error_kind: kind.as_str().to_string(),
                        message: e.to_string(),
                        retriable: matches!(kind, aitoys_domain::ErrorKind::ProviderTransient | aitoys_domain::ErrorKind::Timeout),
                    });
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
