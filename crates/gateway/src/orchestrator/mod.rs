//! The per-session orchestrator: owns one session's `RuntimeState`, turns
//! client frames into VAD/ASR/LLM/TTS module calls, and emits `ServerFrame`s
//! (plus raw binary audio) on an outbound channel. One instance per live
//! websocket connection; the connection handler owns its mailbox.

pub mod audio_archive;
pub mod growth_summarizer;
pub mod prompt;
pub mod sentence;
pub mod state_machine;
pub mod vad_gate;

use std::sync::Arc;
use std::time::{Duration, Instant};

use aitoys_domain::config::ModuleType;
use aitoys_domain::frame::{ClientFrame, ListenState, ServerFrame, TtsState};
use aitoys_domain::model::ChatRole;
use aitoys_domain::stream::StreamEvent;
use aitoys_domain::tool::Message;
use aitoys_domain::{Error, Result};
use base64::Engine;
use aitoys_modules::metrics::MonitorScope;
use aitoys_modules::pricing::PricingTable;
use aitoys_modules::registry::ModuleRegistry;
use aitoys_modules::metrics::MetricsRecorder;
use aitoys_store::{AgentStore, AnalysisStore, ConversationStore, SessionStore};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::cancel::{CancelMap, CancelToken};
use crate::session_lock::SessionLockMap;
use audio_archive::AudioArchive;
use prompt::build_messages;
use sentence::SentenceAccumulator;
use state_machine::RuntimeState;
use vad_gate::VadGate;

/// Deadline for reacquiring the session run-lock after a barge-in cancel
/// before giving up and reporting `busy_dropped` instead of starting the
/// new turn.
const BARGE_IN_DRAIN: Duration = Duration::from_millis(500);
const RECENT_WINDOW: u32 = prompt::RECENT_WINDOW_SIZE;

/// Fallback VAD hysteresis and idle-timeout settings used when an agent's
/// `audio_settings` leaves them unconfigured.
const DEFAULT_VAD_HIGH: f32 = 0.6;
const DEFAULT_VAD_LOW: f32 = 0.3;
const DEFAULT_SILENCE_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_IDLE_TIMEOUT_SECS: u32 = 300;

/// The in-process VAD and forced-segmentation duration math assumes this
/// fixed PCM16 mono format, matching the `hello` response's audio params.
const PCM_SAMPLE_RATE_HZ: u32 = 16_000;
const PCM_BYTES_PER_SAMPLE: usize = 2;

/// LLM stream retries: one retry, only when no content has streamed yet.
const MAX_LLM_ATTEMPTS: u32 = 2;
const LLM_RETRY_BACKOFF: Duration = Duration::from_millis(300);

fn buffer_duration_secs(buffer_len: usize) -> f32 {
    buffer_len as f32 / (PCM_SAMPLE_RATE_HZ as f32 * PCM_BYTES_PER_SAMPLE as f32)
}

/// Listening mode negotiated by the client's `listen` frame: `manual` is
/// driven purely by `listen:start`/`listen:stop`; `auto` finalizes on
/// sustained silence via [`VadGate`]; `realtime` streams every frame to ASR
/// (not yet implemented by any bundled ASR module, so it behaves like
/// `auto` without the hysteresis gate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenMode {
    Manual,
    Auto,
    Realtime,
}

impl ListenMode {
    fn from_str(s: Option<&str>) -> Self {
        match s {
            Some("manual") => ListenMode::Manual,
            Some("realtime") => ListenMode::Realtime,
            _ => ListenMode::Auto,
        }
    }
}

/// A frame destined for the client: either a JSON control frame or a raw
/// binary audio chunk riding the same websocket.
pub enum OutboundFrame {
    Json(ServerFrame),
    Binary(Vec<u8>),
}

/// Shared, cross-session dependencies the orchestrator needs. Constructed
/// once at startup and handed to every session actor.
pub struct OrchestratorDeps {
    pub conversations: Arc<ConversationStore>,
    pub sessions: Arc<SessionStore>,
    pub agents: Arc<AgentStore>,
    pub modules: Arc<ModuleRegistry>,
    pub cancels: Arc<CancelMap>,
    pub locks: Arc<SessionLockMap>,
    pub metrics: Arc<MetricsRecorder>,
    pub pricing: Arc<PricingTable>,
    pub audio_archive: Arc<AudioArchive>,
    pub analysis: Arc<AnalysisStore>,
    pub compaction_threshold: u32,
}

pub struct SessionOrchestrator {
    session_id: Uuid,
    agent_id: i64,
    copilot_mode: bool,
    state: RuntimeState,
    cancel: CancelToken,
    deps: Arc<OrchestratorDeps>,
    out: mpsc::Sender<OutboundFrame>,

    listen_mode: ListenMode,
    vad: Option<VadGate>,
    audio_buffer: Vec<u8>,
    min_recording_secs: Option<u32>,
    max_recording_secs: Option<u32>,
    idle_timeout_secs: Option<u32>,

    /// The turn a spawned [`TurnWorker`] is currently running, if any. This
    /// is the authoritative "is a turn in flight" signal: unlike
    /// `state.is_generating_turn()`, it stays `Some` for the whole lifetime
    /// of the spawned task, which runs concurrently with new incoming
    /// frames rather than blocking their dispatch.
    active_turn: Option<u64>,
    turn_done_tx: mpsc::Sender<u64>,
    turn_done_rx: Option<mpsc::Receiver<u64>>,

    session_started_at: Instant,
    utterance_chars: Vec<usize>,
}

impl SessionOrchestrator {
    pub fn new(
        session_id: Uuid,
        agent_id: i64,
        copilot_mode: bool,
        deps: Arc<OrchestratorDeps>,
        out: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        let cancel = deps.cancels.get_or_register(session_id);
        let (turn_done_tx, turn_done_rx) = mpsc::channel(4);
        Self {
            session_id,
            agent_id,
            copilot_mode,
            state: RuntimeState::Idle,
            cancel,
            deps,
            out,
            listen_mode: ListenMode::Auto,
            vad: None,
            audio_buffer: Vec::new(),
            min_recording_secs: None,
            max_recording_secs: None,
            idle_timeout_secs: None,
            active_turn: None,
            turn_done_tx,
            turn_done_rx: Some(turn_done_rx),
            session_started_at: Instant::now(),
            utterance_chars: Vec::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Hands the connection loop the other end of the turn-completion
    /// mailbox, so it can react to a spawned turn finishing without that
    /// completion blocking frame dispatch. Must be called exactly once,
    /// right after construction.
    pub fn take_turn_done_rx(&mut self) -> mpsc::Receiver<u64> {
        self.turn_done_rx.take().expect("turn_done_rx taken exactly once")
    }

    /// The connection loop calls this when `turn_done_rx` yields a turn id,
    /// clearing `active_turn` and returning to idle once that was in fact
    /// the turn currently tracked (a barge-in may have already claimed it).
    pub fn on_turn_done(&mut self, turn: u64) {
        if self.active_turn == Some(turn) {
            self.active_turn = None;
            self.transition(RuntimeState::Idle);
        }
    }

    /// Closes an idle connection after this many seconds without audio or
    /// text, per the agent's configured `close_connection_no_voice_time`
    /// (cached from the last `listen:start`), or a fallback default.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS) as u64)
    }

    fn transition(&mut self, next: RuntimeState) {
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            tracing::warn!(
                session_id = %self.session_id,
                from = ?self.state,
                to = ?next,
                "illegal state transition attempted, forcing it anyway"
            );
            self.state = next;
        }
    }

    async fn send(&self, frame: ServerFrame) {
        let _ = self.out.send(OutboundFrame::Json(frame)).await;
    }

    async fn send_binary(&self, data: Vec<u8>) {
        let _ = self.out.send(OutboundFrame::Binary(data)).await;
    }

    async fn send_error(&self, err: &Error) {
        self.send(ServerFrame::Error {
            code: err.kind().as_str().to_string(),
            message: err.to_string(),
            details: None,
        })
        .await;
    }

    /// Dispatch one client frame. Binary websocket frames (raw audio) are
    /// handled separately via [`Self::handle_audio_chunk`].
    pub async fn handle_client_frame(&mut self, frame: ClientFrame) -> Result<()> {
        match frame {
            ClientFrame::Hello { .. } => {
                // The handshake itself (session resolve-or-create, `hello`
                // reply) happens before the orchestrator is constructed —
                // by the time a `ClientFrame::Hello` reaches here it is a
                // protocol violation (duplicate hello on an established
                // connection).
                Err(Error::Protocol("hello frame after handshake".into()))
            }
            ClientFrame::Listen {
                state,
                mode,
                text,
                ..
            } => self.handle_listen(state, mode, text).await,
            ClientFrame::Text { content, .. } => self.handle_new_turn(content, None).await,
            ClientFrame::Abort { reason } => {
                self.handle_barge_in(reason).await;
                Ok(())
            }
            ClientFrame::Mcp { payload } => self.handle_mcp(payload).await,
        }
    }

    async fn handle_listen(
        &mut self,
        state: ListenState,
        mode: Option<String>,
        text: Option<String>,
    ) -> Result<()> {
        match state {
            ListenState::Start => {
                // Best-effort: an agent lookup failure shouldn't block
                // listening, it just means config-driven VAD/timeout
                // settings fall back to their defaults for this turn.
                let agent = self.load_agent().await.ok();
                let audio = agent.as_ref().map(|a| a.agent_config.audio_settings.clone());

                let configured_mode = mode.or_else(|| audio.as_ref().and_then(|a| a.listen_mode.clone()));
                self.listen_mode = ListenMode::from_str(configured_mode.as_deref());
                self.audio_buffer.clear();

                let high = audio
                    .as_ref()
                    .and_then(|a| a.vad_confidence_threshold.map(|pair| pair[0]))
                    .or_else(|| audio.as_ref().and_then(|a| a.vad_threshold))
                    .unwrap_or(DEFAULT_VAD_HIGH);
                let low = audio
                    .as_ref()
                    .and_then(|a| a.vad_confidence_threshold.map(|pair| pair[1]))
                    .unwrap_or(DEFAULT_VAD_LOW);
                let silence_timeout = audio
                    .as_ref()
                    .and_then(|a| a.silence_timeout)
                    .map(|secs| Duration::from_secs(secs as u64))
                    .unwrap_or(DEFAULT_SILENCE_TIMEOUT);
                if self.listen_mode != ListenMode::Manual {
                    self.vad = Some(VadGate::new(high, low, silence_timeout));
                }

                self.min_recording_secs = audio.as_ref().and_then(|a| a.min_recording_duration);
                self.max_recording_secs = agent
                    .as_ref()
                    .and_then(|a| a.agent_config.hardware_settings.max_recording_secs)
                    .or_else(|| audio.as_ref().and_then(|a| a.max_recording_duration));
                self.idle_timeout_secs = audio.as_ref().and_then(|a| a.close_connection_no_voice_time);

                self.transition(RuntimeState::Listening);
                Ok(())
            }
            ListenState::Stop => {
                if let Some(text) = text {
                    // Client already ran its own ASR and handed over text.
                    self.finalize_utterance(text).await?;
                } else if !self.audio_buffer.is_empty() {
                    self.finalize_buffered_audio().await?;
                } else {
                    self.transition(RuntimeState::Idle);
                }
                Ok(())
            }
            ListenState::Detect => {
                // Client is probing current VAD state; nothing to do beyond
                // acknowledging via the existing state, no dedicated frame
                // in the wire table for this.
                Ok(())
            }
        }
    }

    /// Feed one binary websocket frame (raw PCM16 audio for the in-process
    /// VAD; opaque bytes for ASR either way).
    pub async fn handle_audio_chunk(&mut self, data: Vec<u8>) -> Result<()> {
        if self.state != RuntimeState::Listening {
            return Ok(());
        }
        self.audio_buffer.extend_from_slice(&data);

        if let Some(gate) = &mut self.vad {
            let samples = bytes_to_i16_samples(&data);
            if gate.push_frame(&samples, Instant::now()) {
                return self.finalize_buffered_audio().await;
            }
        }

        if let Some(max_secs) = self.max_recording_secs {
            if buffer_duration_secs(self.audio_buffer.len()) >= max_secs as f32 {
                tracing::info!(
                    session_id = %self.session_id,
                    max_secs,
                    "max recording duration reached, forcing segmentation"
                );
                return self.finalize_buffered_audio().await;
            }
        }
        Ok(())
    }

    async fn finalize_buffered_audio(&mut self) -> Result<()> {
        let bytes = std::mem::take(&mut self.audio_buffer);
        self.vad = None;

        if let Some(min_secs) = self.min_recording_secs {
            if buffer_duration_secs(bytes.len()) < min_secs as f32 {
                tracing::debug!(
                    session_id = %self.session_id,
                    min_secs,
                    "buffered audio below minimum recording duration, discarding"
                );
                self.transition(RuntimeState::Idle);
                return Ok(());
            }
        }

        self.transition(RuntimeState::Transcribing);

        let agent = self.load_agent().await?;
        let asr_selection = agent.module_params.asr.as_ref().ok_or_else(|| {
            Error::Config(format!("agent {} has no asr module configured", self.agent_id))
        })?;
        let asr = self
            .deps
            .modules
            .get(ModuleType::Asr, &asr_selection.code)
            .ok_or_else(|| Error::Config(format!("asr module {} not registered", asr_selection.code)))?;

        let audio_base64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let transcript = asr
            .call("transcribe", serde_json::json!({ "audio_base64": audio_base64 }))
            .await?;
        let text = transcript
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        if text.trim().is_empty() {
            self.transition(RuntimeState::Idle);
            return Ok(());
        }

        self.send(ServerFrame::Transcript { text: text.clone() }).await;

        let audio_path = self.deps.audio_archive.store(self.agent_id, &bytes).await.ok();
        self.start_turn(text, audio_path).await
    }

    async fn finalize_utterance(&mut self, text: String) -> Result<()> {
        self.transition(RuntimeState::Transcribing);
        self.start_turn(text, None).await
    }

    async fn handle_new_turn(&mut self, content: String, audio_path: Option<String>) -> Result<()> {
        self.start_turn(content, audio_path).await
    }

    /// Barge-in / explicit abort: cancel whatever is in flight, emit an
    /// immediate `tts:stop`, and return to idle. Does not itself start a
    /// new turn — the caller that supplied the interrupting input retries
    /// through `start_turn`, which performs its own bounded lock
    /// acquisition. Because the connection loop's `select!` keeps polling
    /// the socket while a spawned `TurnWorker` streams, this can actually
    /// run mid-turn instead of only after one has already finished.
    async fn handle_barge_in(&mut self, _reason: Option<String>) {
        if self.active_turn.take().is_some() {
            self.cancel.cancel();
            self.transition(RuntimeState::Cancelling);
            self.send(ServerFrame::Tts {
                state: TtsState::Stop,
                text: None,
            })
            .await;
        }
        self.transition(RuntimeState::Idle);
    }

    async fn handle_mcp(&mut self, payload: serde_json::Value) -> Result<()> {
        // Opaque passthrough: the gateway has no opinion on tool-call
        // envelopes, it just republishes them to whatever is listening.
        self.send(ServerFrame::Mcp { payload }).await;
        Ok(())
    }

    async fn load_agent(&self) -> Result<aitoys_store::EffectiveAgentConfig> {
        self.deps
            .agents
            .get(self.agent_id)
            .await?
            .ok_or_else(|| Error::Config(format!("unknown agent {}", self.agent_id)))
    }

    /// Starts one full VAD(done)->LLM->TTS turn as an independent spawned
    /// task, so the connection loop's frame dispatch never blocks on it —
    /// a `text`/`abort` frame arriving mid-turn is read and acted on
    /// (barge-in) while the previous turn's `TurnWorker` is still
    /// streaming. Implements the at-most-one-generation invariant: a turn
    /// already in flight is barged-in first, exactly like an explicit
    /// client abort.
    async fn start_turn(&mut self, user_text: String, audio_path: Option<String>) -> Result<()> {
        if self.active_turn.is_some() {
            self.handle_barge_in(None).await;
        }

        let permit = match tokio::time::timeout(
            BARGE_IN_DRAIN,
            self.deps.locks.acquire(self.session_id),
        )
        .await
        {
            Ok(permit) => permit,
            Err(_) => {
                let err = Error::BusyDropped;
                self.send_error(&err).await;
                return Ok(());
            }
        };

        let turn = self.cancel.begin_turn();
        self.active_turn = Some(turn);
        self.utterance_chars.push(user_text.chars().count());
        self.transition(RuntimeState::Generating);

        let worker = TurnWorker {
            session_id: self.session_id,
            agent_id: self.agent_id,
            copilot_mode: self.copilot_mode,
            deps: self.deps.clone(),
            cancel: self.cancel.clone(),
            out: self.out.clone(),
        };
        let turn_done_tx = self.turn_done_tx.clone();
        tokio::spawn(async move {
            let result = worker.run_turn(user_text, audio_path, turn).await;
            drop(permit);
            if let Err(err) = &result {
                worker.send_error(err).await;
            }
            let _ = turn_done_tx.send(turn).await;
        });

        Ok(())
    }

    pub async fn handle_disconnect(&mut self) {
        self.cancel.cancel();
        self.transition(RuntimeState::Closed);
        self.deps.cancels.remove(self.session_id);

        let duration_secs = self.session_started_at.elapsed().as_secs() as u32;
        let avg_utterance_len = if self.utterance_chars.is_empty() {
            0.0
        } else {
            self.utterance_chars.iter().sum::<usize>() as f32 / self.utterance_chars.len() as f32
        };
        if let Err(e) = self
            .deps
            .analysis
            .schedule(self.session_id, duration_secs, avg_utterance_len)
            .await
        {
            tracing::warn!(session_id = %self.session_id, error = %e, "failed to schedule session analysis");
        }
    }
}

/// Runs one spawned turn's LLM/TTS work off the orchestrator's own
/// `&mut self`, so its mutable state (`RuntimeState`, `listen_mode`, `vad`,
/// `audio_buffer`) stays exclusively owned by the connection task while
/// the multi-second provider calls run independently. Only holds
/// `Arc`/cheap-`Clone` handles, so it can move into a `tokio::spawn`ed
/// task without borrowing the orchestrator.
struct TurnWorker {
    session_id: Uuid,
    agent_id: i64,
    copilot_mode: bool,
    deps: Arc<OrchestratorDeps>,
    cancel: CancelToken,
    out: mpsc::Sender<OutboundFrame>,
}

impl TurnWorker {
    async fn send(&self, frame: ServerFrame) {
        let _ = self.out.send(OutboundFrame::Json(frame)).await;
    }

    async fn send_binary(&self, data: Vec<u8>) {
        let _ = self.out.send(OutboundFrame::Binary(data)).await;
    }

    async fn send_error(&self, err: &Error) {
        self.send(ServerFrame::Error {
            code: err.kind().as_str().to_string(),
            message: err.to_string(),
            details: None,
        })
        .await;
    }

    async fn load_agent(&self) -> Result<aitoys_store::EffectiveAgentConfig> {
        self.deps
            .agents
            .get(self.agent_id)
            .await?
            .ok_or_else(|| Error::Config(format!("unknown agent {}", self.agent_id)))
    }

    async fn run_turn(&self, user_text: String, audio_path: Option<String>, turn: u64) -> Result<()> {
        let agent = self.load_agent().await?;

        self.deps
            .conversations
            .append_message(
                self.session_id,
                self.agent_id,
                ChatRole::User,
                &user_text,
                audio_path.as_deref(),
                None,
                self.copilot_mode,
            )
            .await?;

        let llm_selection = agent.module_params.llm.as_ref().ok_or_else(|| {
            Error::Config(format!("agent {} has no llm module configured", self.agent_id))
        })?;
        let llm = self
            .deps
            .modules
            .get(ModuleType::Llm, &llm_selection.code)
            .ok_or_else(|| Error::Config(format!("llm module {} not registered", llm_selection.code)))?;

        let window = self
            .deps
            .conversations
            .recent_window(self.agent_id, self.copilot_mode, RECENT_WINDOW)
            .await?;
        let messages = build_messages(&agent.agent_config, &window, &user_text);

        let model = llm_selection
            .config
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("default")
            .to_string();

        let mut accumulator = SentenceAccumulator::new();
        let mut full_content = String::new();
        let mut output_tokens = 0u32;
        let mut was_cancelled = false;
        let mut attempt = 0u32;

        self.send(ServerFrame::Tts {
            state: TtsState::Start,
            text: None,
        })
        .await;

        'attempts: loop {
            attempt += 1;
            let mut monitor =
                MonitorScope::open(llm_selection.code.clone(), model.clone(), self.session_id, user_text.len() as u32);
            let mut stream = llm
                .call_stream("chat", serde_json::json!({ "messages": messages }))
                .await?;

            while let Some(event) = stream.next().await {
                if self.cancel.is_cancelled() || self.cancel.current_turn() != turn {
                    was_cancelled = true;
                    break;
                }
                match event? {
                    StreamEvent::Token { text } => {
                        monitor.record_first_token();
                        full_content.push_str(&text);
                        output_tokens += 1;
                        self.send(ServerFrame::Llm {
                            content: Some(text.clone()),
                            emotion: None,
                            finished: None,
                        })
                        .await;

                        for sentence in accumulator.push(&text) {
                            self.speak_sentence(&agent, &sentence, turn).await?;
                        }
                    }
                    StreamEvent::Done { usage } => {
                        if let Some(u) = usage {
                            output_tokens = u.completion_tokens;
                        }
                        break;
                    }
                    StreamEvent::Error { message, retriable, .. } => {
                        // Retry once, but only if nothing has streamed back
                        // to the client yet this turn — partial output
                        // already sent can't be un-sent.
                        if retriable && full_content.is_empty() && attempt < MAX_LLM_ATTEMPTS {
                            let cost = self.deps.pricing.estimate(&model, user_text.len() as u32 / 4, output_tokens);
                            let metric = monitor.close(0, user_text.len() as u32 / 4, output_tokens, 0, cost);
                            self.deps.metrics.record(self.agent_id, metric);
                            tracing::info!(session_id = %self.session_id, attempt, %message, "llm stream error, retrying once");
                            tokio::time::sleep(LLM_RETRY_BACKOFF).await;
                            continue 'attempts;
                        }
                        return Err(Error::Module {
                            module: "llm".into(),
                            message,
                            retriable,
                        });
                    }
                    _ => {}
                }
            }

            if let Some(last) = accumulator.finish() {
                if !was_cancelled {
                    self.speak_sentence(&agent, &last, turn).await?;
                }
            }

            self.send(ServerFrame::Tts {
                state: TtsState::Stop,
                text: None,
            })
            .await;
            let emotion = if was_cancelled { Some("truncated") } else { None };
            self.send(ServerFrame::Llm {
                content: None,
                emotion: emotion.map(|s| s.to_string()),
                finished: Some(true),
            })
            .await;

            if !full_content.is_empty() {
                self.deps
                    .conversations
                    .append_message(
                        self.session_id,
                        self.agent_id,
                        ChatRole::Assistant,
                        &full_content,
                        None,
                        emotion,
                        self.copilot_mode,
                    )
                    .await?;
            }

            let cost = self
                .deps
                .pricing
                .estimate(&model, user_text.len() as u32 / 4, output_tokens);
            let metric = monitor.close(full_content.len() as u32, user_text.len() as u32 / 4, output_tokens, 0, cost);
            self.deps.metrics.record(self.agent_id, metric);
            break;
        }

        self.spawn_best_effort_compaction();
        Ok(())
    }

    async fn speak_sentence(
        &self,
        agent: &aitoys_store::EffectiveAgentConfig,
        sentence: &str,
        turn: u64,
    ) -> Result<()> {
        let tts_selection = agent.module_params.tts.as_ref().ok_or_else(|| {
            Error::Config(format!("agent {} has no tts module configured", self.agent_id))
        })?;
        let tts = self
            .deps
            .modules
            .get(ModuleType::Tts, &tts_selection.code)
            .ok_or_else(|| Error::Config(format!("tts module {} not registered", tts_selection.code)))?;

        self.send(ServerFrame::Tts {
            state: TtsState::SentenceStart,
            text: Some(sentence.to_string()),
        })
        .await;

        let mut stream = tts
            .call_stream("synthesize", serde_json::json!({ "text": sentence }))
            .await?;

        while let Some(event) = stream.next().await {
            if self.cancel.is_cancelled() || self.cancel.current_turn() != turn {
                break;
            }
            match event? {
                StreamEvent::Audio { data } => self.send_binary(data).await,
                StreamEvent::Done { .. } => break,
                StreamEvent::Error { message, retriable, .. } => {
                    return Err(Error::Module {
                        module: "tts".into(),
                        message,
                        retriable,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Compaction never blocks turn completion and its failure is logged,
    /// not surfaced to the client — it is maintenance, not user-visible
    /// behaviour.
    fn spawn_best_effort_compaction(&self) {
        let conversations = self.deps.conversations.clone();
        let agents = self.deps.agents.clone();
        let modules = self.deps.modules.clone();
        let agent_id = self.agent_id;
        let copilot_mode = self.copilot_mode;
        let threshold = self.deps.compaction_threshold;
        tokio::spawn(async move {
            let agent = match agents.get(agent_id).await {
                Ok(Some(agent)) => agent,
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(agent_id, error = %e, "best-effort compaction: agent lookup failed");
                    return;
                }
            };
            let Some(llm_selection) = agent.module_params.llm else { return };
            let Some(llm) = modules.get(ModuleType::Llm, &llm_selection.code) else {
                return;
            };
            let summarizer = ModuleSummarizer { llm };
            if let Err(e) = conversations
                .compact_if_needed(agent_id, copilot_mode, threshold, &summarizer)
                .await
            {
                tracing::warn!(agent_id, error = %e, "best-effort compaction failed");
            }
        });
    }
}

fn bytes_to_i16_samples(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

struct ModuleSummarizer {
    llm: Arc<dyn aitoys_modules::module::Module>,
}

#[async_trait::async_trait]
impl aitoys_store::ConversationSummarizer for ModuleSummarizer {
    async fn summarize(
        &self,
        messages: &[aitoys_domain::model::ChatMessage],
        prior_summary: Option<&str>,
    ) -> Result<String> {
        let mut prompt_messages = vec![Message::system(
            "Summarize the following conversation turns concisely, preserving facts the child shared about themselves.",
        )];
        if let Some(prior) = prior_summary {
            prompt_messages.push(Message::system(format!("Prior summary: {prior}")));
        }
        for m in messages {
            match m.role {
                ChatRole::User => prompt_messages.push(Message::user(m.content.clone())),
                ChatRole::Assistant => prompt_messages.push(Message::assistant(m.content.clone())),
            }
        }
        let result = self
            .llm
            .call("chat", serde_json::json!({ "messages": prompt_messages }))
            .await?;
        Ok(result
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_mode_defaults_to_auto() {
        assert_eq!(ListenMode::from_str(None), ListenMode::Auto);
        assert_eq!(ListenMode::from_str(Some("manual")), ListenMode::Manual);
        assert_eq!(ListenMode::from_str(Some("realtime")), ListenMode::Realtime);
        assert_eq!(ListenMode::from_str(Some("garbage")), ListenMode::Auto);
    }

    #[test]
    fn bytes_to_i16_samples_decodes_little_endian_pcm() {
        let bytes = [0x00, 0x00, 0xFF, 0x7F];
        let samples = bytes_to_i16_samples(&bytes);
        assert_eq!(samples, vec![0, i16::MAX]);
    }
}
