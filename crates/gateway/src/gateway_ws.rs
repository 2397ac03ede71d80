//! `GET /ws/chat` — the voice/text gateway endpoint.
//!
//! Connect sequence: verify the bearer token, upgrade, wait for the
//! client's `hello` within the configured deadline, reply with the
//! negotiated transport/audio parameters, then drive one
//! `SessionOrchestrator` for the lifetime of the socket. A reconnect
//! carrying the same `client_id` supplants whatever connection currently
//! holds it and resumes its `session_id`.

use std::time::Duration;

use aitoys_domain::frame::{ClientFrame, ServerFrame};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::auth::{bearer_from_header, verify};
use crate::orchestrator::{OutboundFrame, SessionOrchestrator};
use crate::state::AppState;

/// Fixed identity this gateway operates under. User/agent ownership and
/// multi-tenant auth live behind the HTTP CRUD surface this crate does
/// not implement; the bearer token authenticates the device/client, not
/// a specific user row.
const SINGLE_TENANT_USER_ID: i64 = 1;

/// Fallback idle-connection timeout used before the orchestrator exists
/// (no `listen:start` has set a configured `close_connection_no_voice_time`
/// yet) — matches [`crate::orchestrator::SessionOrchestrator::idle_timeout`]'s
/// own default.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    #[serde(default)]
    pub protocol_version: Option<u32>,
    pub client_id: Option<Uuid>,
}

pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let header_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let presented = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| bearer_from_header(header_token));

    if !verify(&state.api_token_hash, presented) {
        return (axum::http::StatusCode::UNAUTHORIZED, "invalid or missing token").into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState, query: WsQuery) {
    let (mut sink, mut stream) = socket.split();

    let hello = match wait_for_hello(&mut stream, state.config.server.hello_timeout_ms).await {
        Some(hello) => hello,
        None => {
            let _ = send_json(
                &mut sink,
                &ServerFrame::Error {
                    code: "protocol".into(),
                    message: "timed out waiting for hello".into(),
                    details: None,
                },
            )
            .await;
            return;
        }
    };

    let client_id = query.client_id.unwrap_or_else(Uuid::new_v4);
    let resumed_session_id = state.connections.resumable_session(client_id);
    let (session_id, resumed) = match resumed_session_id {
        Some(id) => (id, true),
        None => (Uuid::new_v4(), false),
    };

    let (kill_tx, mut kill_rx) = oneshot::channel();
    state.connections.attach(client_id, session_id, kill_tx);

    let audio_params = serde_json::json!({
        "format": "opus",
        "sample_rate": 16_000,
        "channels": 1,
        "frame_duration_ms": 60,
    });
    if send_json(
        &mut sink,
        &ServerFrame::Hello {
            session_id,
            resumed,
            transport: hello.transport,
            audio_params,
        },
    )
    .await
    .is_err()
    {
        state.connections.detach(client_id, session_id);
        return;
    }

    tracing::info!(%session_id, %client_id, resumed, "gateway connection established");

    let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(64);
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let sent = match frame {
                OutboundFrame::Json(frame) => send_json(&mut sink, &frame).await,
                OutboundFrame::Binary(data) => sink.send(Message::Binary(data)).await.map_err(|_| ()),
            };
            if sent.is_err() {
                break;
            }
        }
    });

    let mut orchestrator: Option<SessionOrchestrator> = None;
    let mut turn_done_rx: Option<mpsc::Receiver<u64>> = None;
    let mut last_activity = tokio::time::Instant::now();

    loop {
        let idle_timeout = orchestrator
            .as_ref()
            .map(|o| o.idle_timeout())
            .unwrap_or(DEFAULT_IDLE_TIMEOUT);
        let idle_deadline = last_activity + idle_timeout;

        tokio::select! {
            _ = &mut kill_rx => {
                let _ = out_tx.send(OutboundFrame::Json(ServerFrame::Error {
                    code: "protocol".into(),
                    message: "supplanted by a newer connection".into(),
                    details: None,
                })).await;
                break;
            }
            _ = tokio::time::sleep_until(idle_deadline) => {
                tracing::info!(%session_id, ?idle_timeout, "closing idle connection");
                let _ = out_tx.send(OutboundFrame::Json(ServerFrame::Error {
                    code: "idle_timeout".into(),
                    message: "connection idle for too long without audio or text".into(),
                    details: None,
                })).await;
                break;
            }
            Some(turn) = async {
                match turn_done_rx.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => None,
                }
            }, if turn_done_rx.is_some() => {
                if let Some(orch) = orchestrator.as_mut() {
                    orch.on_turn_done(turn);
                }
            }
            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        last_activity = tokio::time::Instant::now();
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(frame) => {
                                dispatch_frame(&state, &mut orchestrator, session_id, &out_tx, frame).await;
                                if turn_done_rx.is_none() {
                                    if let Some(orch) = orchestrator.as_mut() {
                                        turn_done_rx = Some(orch.take_turn_done_rx());
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::debug!(%session_id, error = %e, "ignoring unparseable frame");
                            }
                        }
                    }
                    Message::Binary(data) => {
                        last_activity = tokio::time::Instant::now();
                        if let Some(orch) = orchestrator.as_mut() {
                            if let Err(e) = orch.handle_audio_chunk(data).await {
                                tracing::warn!(%session_id, error = %e, "error handling audio chunk");
                            }
                        }
                    }
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    }

    if let Some(mut orch) = orchestrator {
        orch.handle_disconnect().await;
    }
    writer.abort();
    state.connections.detach(client_id, session_id);
    tracing::info!(%session_id, %client_id, "gateway connection closed");
}

/// `ClientFrame::Hello` plus whatever was actually useful about it once
/// parsed; the rest of the handshake negotiation lives in the caller.
struct Hello {
    transport: String,
}

async fn wait_for_hello(
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    timeout_ms: u64,
) -> Option<Hello> {
    let result = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Ok(ClientFrame::Hello { transport, .. }) = serde_json::from_str::<ClientFrame>(&text) {
                    return Some(Hello { transport });
                }
            }
        }
        None
    })
    .await;
    result.unwrap_or(None)
}

async fn send_json(
    sink: &mut (impl SinkExt<Message> + Unpin),
    frame: &ServerFrame,
) -> Result<(), ()> {
    let json = serde_json::to_string(frame).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}

/// Turns an already-parsed `ClientFrame` into orchestrator calls, lazily
/// constructing the orchestrator on the first frame that carries an
/// `agent_id` (the orchestrator is fixed to one agent for its lifetime;
/// `hello` carries none, so there is no agent to bind to until here).
async fn dispatch_frame(
    state: &AppState,
    orchestrator: &mut Option<SessionOrchestrator>,
    session_id: Uuid,
    out_tx: &mpsc::Sender<OutboundFrame>,
    frame: ClientFrame,
) {
    if orchestrator.is_none() {
        let agent_id = match &frame {
            ClientFrame::Text { agent_id, .. } => Some(*agent_id),
            ClientFrame::Listen { agent_id, .. } => *agent_id,
            _ => None,
        };
        let Some(agent_id) = agent_id else {
            if matches!(frame, ClientFrame::Hello { .. }) {
                let _ = out_tx
                    .send(OutboundFrame::Json(ServerFrame::Error {
                        code: "protocol".into(),
                        message: "hello frame after handshake".into(),
                        details: None,
                    }))
                    .await;
            } else {
                tracing::debug!(%session_id, "dropping frame received before an agent_id was established");
            }
            return;
        };

        if let Err(e) = state
            .sessions
            .resolve_or_create(Some(session_id), SINGLE_TENANT_USER_ID, agent_id, false)
            .await
        {
            tracing::warn!(%session_id, agent_id, error = %e, "failed to resolve session row");
            let _ = out_tx
                .send(OutboundFrame::Json(ServerFrame::Error {
                    code: "internal".into(),
                    message: e.to_string(),
                    details: None,
                }))
                .await;
            return;
        }

        *orchestrator = Some(SessionOrchestrator::new(
            session_id,
            agent_id,
            false,
            state.orchestrator_deps(),
            out_tx.clone(),
        ));
    }

    let orch = orchestrator.as_mut().expect("constructed above");
    if let Err(e) = orch.handle_client_frame(frame).await {
        tracing::warn!(%session_id, error = %e, "error handling client frame");
    }
}
