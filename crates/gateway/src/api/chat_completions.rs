//! Legacy `/v1/chat/completions` HTTP shim, kept for clients that predate
//! the websocket gateway. Accepts an OpenAI-shaped chat-completions
//! request extended with the `agent_id` this gateway actually needs, and
//! drives the same `SessionOrchestrator` turn the websocket path uses —
//! emitting only `llm` content deltas, never audio.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use aitoys_domain::frame::ClientFrame;
use crate::orchestrator::{OutboundFrame, SessionOrchestrator};
use crate::state::AppState;

const SINGLE_TENANT_USER_ID: i64 = 1;

/// Upper bound on how long this shim waits for the spawned turn to finish
/// before tearing the orchestrator down anyway — a stuck provider call
/// shouldn't leak the task forever.
const CHAT_COMPLETIONS_TURN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

#[derive(Debug, Deserialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionsMessage>,
    #[serde(default)]
    pub stream: bool,
    pub agent_id: i64,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionsMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionsResponse {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<Choice>,
}

#[derive(Debug, Serialize)]
struct Choice {
    index: u32,
    message: ResponseMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct ResponseMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct Chunk {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize)]
struct ChunkChoice {
    index: u32,
    delta: ChunkDelta,
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(body): Json<ChatCompletionsRequest>,
) -> impl IntoResponse {
    let Some(user_message) = extract_last_user_message(&body.messages) else {
        return error_response(
            axum::http::StatusCode::BAD_REQUEST,
            "no user message found in messages array",
        )
        .into_response();
    };

    let session = match state
        .sessions
        .resolve_or_create(body.session_id, SINGLE_TENANT_USER_ID, body.agent_id, false)
        .await
    {
        Ok((session, _resumed)) => session,
        Err(e) => return error_response(axum::http::StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()).into_response(),
    };

    let (out_tx, out_rx) = mpsc::channel::<OutboundFrame>(64);
    let mut orchestrator = SessionOrchestrator::new(
        session.id,
        body.agent_id,
        false,
        state.orchestrator_deps(),
        out_tx,
    );
    let mut turn_done_rx = orchestrator.take_turn_done_rx();

    tokio::spawn(async move {
        let _ = orchestrator
            .handle_client_frame(ClientFrame::Text {
                content: user_message,
                agent_id: body.agent_id,
                session_id: Some(session.id),
            })
            .await;
        // `handle_client_frame` only starts the turn; the LLM/TTS work
        // runs in a spawned task, so wait for it to actually finish
        // before tearing the orchestrator down, or the turn gets
        // cancelled out from under itself.
        let _ = tokio::time::timeout(CHAT_COMPLETIONS_TURN_TIMEOUT, turn_done_rx.recv()).await;
        orchestrator.handle_disconnect().await;
    });

    let completion_id = format!("chatcmpl-{}", Uuid::new_v4());
    let created = chrono::Utc::now().timestamp();

    if body.stream {
        let stream = sse_stream(out_rx, completion_id, created, body.model);
        Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
    } else {
        blocking_response(out_rx, completion_id, created, body.model).await.into_response()
    }
}

async fn blocking_response(
    mut rx: mpsc::Receiver<OutboundFrame>,
    id: String,
    created: i64,
    model: String,
) -> impl IntoResponse {
    let mut content = String::new();
    while let Some(frame) = rx.recv().await {
        if let OutboundFrame::Json(aitoys_domain::frame::ServerFrame::Llm { content: Some(delta), .. }) = frame {
            content.push_str(&delta);
        }
    }

    Json(ChatCompletionsResponse {
        id,
        object: "chat.completion",
        created,
        model,
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage { role: "assistant", content },
            finish_reason: "stop",
        }],
    })
}

fn sse_stream(
    mut rx: mpsc::Receiver<OutboundFrame>,
    id: String,
    created: i64,
    model: String,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let initial = Chunk {
            id: id.clone(),
            object: "chat.completion.chunk",
            created,
            model: model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta { role: Some("assistant"), content: None },
                finish_reason: None,
            }],
        };
        if let Ok(data) = serde_json::to_string(&initial) {
            yield Ok(Event::default().data(data));
        }

        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Json(aitoys_domain::frame::ServerFrame::Llm { content: Some(delta), finished, .. }) => {
                    let chunk = Chunk {
                        id: id.clone(),
                        object: "chat.completion.chunk",
                        created,
                        model: model.clone(),
                        choices: vec![ChunkChoice {
                            index: 0,
                            delta: ChunkDelta { role: None, content: Some(delta) },
                            finish_reason: finished.and(Some("stop")),
                        }],
                    };
                    if let Ok(data) = serde_json::to_string(&chunk) {
                        yield Ok(Event::default().data(data));
                    }
                }
                OutboundFrame::Json(aitoys_domain::frame::ServerFrame::Llm { finished: Some(true), .. }) => {
                    let chunk = Chunk {
                        id: id.clone(),
                        object: "chat.completion.chunk",
                        created,
                        model: model.clone(),
                        choices: vec![ChunkChoice {
                            index: 0,
                            delta: ChunkDelta { role: None, content: None },
                            finish_reason: Some("stop"),
                        }],
                    };
                    if let Ok(data) = serde_json::to_string(&chunk) {
                        yield Ok(Event::default().data(data));
                    }
                }
                OutboundFrame::Json(aitoys_domain::frame::ServerFrame::Error { message, .. }) => {
                    let err = serde_json::json!({ "error": { "message": message, "type": "server_error" } });
                    yield Ok(Event::default().data(err.to_string()));
                }
                // Audio, transcript, and mcp frames have no place in this shim.
                _ => {}
            }
        }

        yield Ok(Event::default().data("[DONE]"));
    }
}

fn extract_last_user_message(messages: &[ChatCompletionsMessage]) -> Option<String> {
    messages.iter().rev().find(|m| m.role == "user").map(|m| m.content.clone())
}

fn error_response(status: axum::http::StatusCode, message: &str) -> (axum::http::StatusCode, Json<serde_json::Value>) {
    (
        status,
        Json(serde_json::json!({ "error": { "message": message, "type": "server_error" } })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> ChatCompletionsMessage {
        ChatCompletionsMessage { role: role.into(), content: content.into() }
    }

    #[test]
    fn extract_last_user_message_picks_the_most_recent_one() {
        let messages = vec![
            msg("system", "you are a helpful toy"),
            msg("user", "first question"),
            msg("assistant", "first answer"),
            msg("user", "second question"),
        ];
        assert_eq!(extract_last_user_message(&messages).as_deref(), Some("second question"));
    }

    #[test]
    fn extract_last_user_message_is_none_without_a_user_turn() {
        let messages = vec![msg("system", "you are a helpful toy")];
        assert_eq!(extract_last_user_message(&messages), None);
    }
}
