//! OpenAI-compatible LLM module: works with OpenAI, Azure OpenAI, Ollama,
//! vLLM, and any other endpoint following the OpenAI chat-completions wire
//! format. Answers the `"chat"` tool name; `arguments` is `{ messages,
//! tools?, temperature?, max_tokens?, json_mode? }`.

use std::time::Duration;

use aitoys_domain::config::ModuleRegistrationConfig;
use aitoys_domain::stream::{StreamEvent, Usage};
use aitoys_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolSpec};
use aitoys_domain::{Error, Result};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use serde::Deserialize;
use serde_json::Value;

use crate::http_util::{apply_auth, from_reqwest};
use crate::module::{Module, ModuleFactory};
use crate::sse::sse_response_stream;

pub struct OpenAiCompatLlmModule {
    code: String,
    base_url: String,
    auth: aitoys_domain::config::AuthConfig,
    default_model: String,
    client: reqwest::Client,
}

pub struct OpenAiCompatLlmFactory;

#[async_trait]
impl ModuleFactory for OpenAiCompatLlmFactory {
    async fn create(&self, config: &ModuleRegistrationConfig) -> Result<Box<dyn Module>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Box::new(OpenAiCompatLlmModule {
            code: config.code.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
            default_model: config.default_model.clone().unwrap_or_else(|| "gpt-4o".into()),
            client,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ChatArgs {
    messages: Vec<Message>,
    #[serde(default)]
    tools: Vec<ToolSpec>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    model: Option<String>,
}

impl OpenAiCompatLlmModule {
    fn build_body(&self, args: &ChatArgs, stream: bool) -> Value {
        let messages: Vec<Value> = args.messages.iter().map(msg_to_openai).collect();
        let mut body = serde_json::json!({
            "model": args.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": messages,
            "stream": stream,
        });
        if !args.tools.is_empty() {
            let tools: Vec<Value> = args.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(t) = args.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(m) = args.max_tokens {
            body["max_tokens"] = serde_json::json!(m);
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }
}

#[async_trait]
impl Module for OpenAiCompatLlmModule {
    fn name(&self) -> &str {
        &self.code
    }

    fn description(&self) -> &str {
        "OpenAI-compatible chat completion module"
    }

    async fn call(&self, tool_name: &str, arguments: Value) -> Result<Value> {
        if tool_name != "chat" {
            return Err(Error::Protocol(format!("unsupported tool {tool_name}")));
        }
        let args: ChatArgs = serde_json::from_value(arguments)?;
        let url = format!("{}/chat/completions", self.base_url);
        let req = apply_auth(self.client.post(&url), &self.auth)?;
        let resp = req
            .json(&self.build_body(&args, false))
            .send()
            .await
            .map_err(from_reqwest)?;
        if !resp.status().is_success() {
            let retriable = resp.status().is_server_error();
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Module {
                module: "llm".into(),
                message: format!("http {status}: {text}"),
                retriable,
            });
        }
        let body: Value = resp.json().await.map_err(from_reqwest)?;
        parse_chat_response(&body)
    }

    async fn call_stream(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        if tool_name != "chat" {
            return Err(Error::Protocol(format!("unsupported tool {tool_name}")));
        }
        let args: ChatArgs = serde_json::from_value(arguments)?;
        let url = format!("{}/chat/completions", self.base_url);
        let req = apply_auth(self.client.post(&url), &self.auth)?;
        let resp = req
            .json(&self.build_body(&args, true))
            .send()
            .await
            .map_err(from_reqwest)?;
        if !resp.status().is_success() {
            let retriable = resp.status().is_server_error();
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Module {
                module: "llm".into(),
                message: format!("http {status}: {text}"),
                retriable,
            });
        }
        Ok(sse_response_stream(resp, parse_sse_data))
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_openai(msg),
        Role::Assistant => assistant_to_openai(msg),
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content.extract_all_text(),
        }),
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text_parts.push(t.clone()),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": { "name": name, "arguments": input.to_string() },
                        }));
                    }
                    _ => {}
                }
            }
        }
    }

    obj["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_openai(msg: &Message) -> Value {
    if let MessageContent::Parts(parts) = &msg.content {
        for part in parts {
            if let ContentPart::ToolResult { tool_use_id, content, .. } = part {
                return serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                });
            }
        }
    }
    serde_json::json!({
        "role": "tool",
        "tool_call_id": "",
        "content": msg.content.extract_all_text(),
    })
}

fn tool_to_openai(tool: &ToolSpec) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn parse_chat_response(body: &Value) -> Result<Value> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Module {
            module: "llm".into(),
            message: "no choices in response".into(),
            retriable: false,
        })?;
    let message = choice.get("message").cloned().unwrap_or(Value::Null);
    let content = message.get("content").and_then(|v| v.as_str()).unwrap_or("");
    let tool_calls = parse_openai_tool_calls(&message);
    Ok(serde_json::json!({
        "content": content,
        "tool_calls": tool_calls,
        "finish_reason": choice.get("finish_reason"),
        "model": body.get("model"),
    }))
}

fn parse_openai_tool_calls(message: &Value) -> Vec<ToolCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let call_id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let tool_name = func.get("name")?.as_str()?.to_string();
            let args_str = func.get("arguments")?.as_str().unwrap_or("{}");
            let arguments: Value = serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
            Some(ToolCall { call_id, tool_name, arguments })
        })
        .collect()
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
    })
}

fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return Vec::new();
    }
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let choice = v.get("choices").and_then(|c| c.as_array()).and_then(|a| a.first());
    let Some(choice) = choice else {
        if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
            return vec![Ok(StreamEvent::Done { usage: Some(usage) })];
        }
        return Vec::new();
    };

    let delta = choice.get("delta").cloned().unwrap_or(Value::Null);
    let mut events = Vec::new();

    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0).to_string();
            if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                let name = tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                events.push(Ok(StreamEvent::ToolCallStarted {
                    call_id: id.to_string(),
                    tool_name: name.to_string(),
                }));
            }
            if let Some(args) = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
            {
                events.push(Ok(StreamEvent::ToolCallDelta {
                    call_id: idx.clone(),
                    arguments_fragment: args.to_string(),
                }));
            }
        }
    }

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Token { text: text.to_string() }));
        }
    }

    if choice.get("finish_reason").and_then(|f| f.as_str()).is_some() {
        let usage = v.get("usage").and_then(parse_openai_usage);
        events.push(Ok(StreamEvent::Done { usage }));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sse_data_ignores_done_sentinel() {
        assert!(parse_sse_data("[DONE]").is_empty());
    }

    #[test]
    fn parse_sse_data_emits_token_for_content_delta() {
        let events = parse_sse_data(
            r#"{"choices":[{"delta":{"content":"hi"},"index":0}]}"#,
        );
        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            StreamEvent::Token { text } => assert_eq!(text, "hi"),
            _ => panic!("expected token"),
        }
    }

    #[test]
    fn parse_sse_data_emits_done_on_finish_reason() {
        let events = parse_sse_data(
            r#"{"choices":[{"delta":{},"finish_reason":"stop","index":0}]}"#,
        );
        assert!(matches!(events.last().unwrap().as_ref().unwrap(), StreamEvent::Done { .. }));
    }

    #[test]
    fn parse_chat_response_extracts_content_and_tool_calls() {
        let body = serde_json::json!({
            "model": "gpt-4o",
            "choices": [{
                "finish_reason": "stop",
                "message": {
                    "content": "hello there",
                    "tool_calls": [{
                        "id": "call_1",
                        "function": { "name": "get_weather", "arguments": "{\"city\":\"nyc\"}" }
                    }]
                }
            }]
        });
        let result = parse_chat_response(&body).unwrap();
        assert_eq!(result["content"], "hello there");
        assert_eq!(result["tool_calls"][0]["tool_name"], "get_weather");
    }
}
