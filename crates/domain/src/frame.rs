use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A frame sent by the client (toy firmware or browser) over the gateway
/// websocket. Authentication and `client_id` travel outside this enum, as
/// connect-time headers/query params, not as frame fields.
///
/// Heartbeat is a transport-level WebSocket ping, not a JSON frame — there
/// is deliberately no `Ping` variant here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// First frame on every connection.
    Hello {
        version: u32,
        transport: String,
        #[serde(default)]
        features: Option<serde_json::Value>,
        #[serde(default)]
        audio_params: Option<serde_json::Value>,
    },

    /// Starts, stops, or probes listening. Binary audio for the utterance
    /// travels as separate websocket binary messages; `text` lets a client
    /// that already ran its own ASR hand over the transcript directly
    /// instead of streaming audio.
    Listen {
        state: ListenState,
        #[serde(default)]
        mode: Option<String>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        agent_id: Option<i64>,
        #[serde(default)]
        session_id: Option<Uuid>,
    },

    /// Text input bypassing ASR entirely (browser client typing instead of
    /// speaking).
    Text {
        content: String,
        agent_id: i64,
        #[serde(default)]
        session_id: Option<Uuid>,
    },

    /// Client-initiated barge-in: cancel whatever the orchestrator is doing
    /// for this session and return to listening.
    Abort {
        #[serde(default)]
        reason: Option<String>,
    },

    /// Opaque tool-call envelope. The gateway reads only the `type`
    /// discriminator and republishes the remaining fields unmodified to the
    /// LLM module's tool-calling surface.
    Mcp {
        #[serde(flatten)]
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenState {
    Start,
    Stop,
    Detect,
}

/// A frame sent by the gateway to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Reply to the client's `hello`, echoing negotiated transport and
    /// audio parameters.
    Hello {
        session_id: Uuid,
        resumed: bool,
        transport: String,
        audio_params: serde_json::Value,
    },

    /// Streamed LLM content delta. A turn ends with one frame carrying
    /// `finished:true`; empty-output turns emit exactly that frame with no
    /// preceding content deltas.
    Llm {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        emotion: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finished: Option<bool>,
    },

    /// TTS control frame. The synthesized audio itself never rides in here —
    /// it goes out as raw binary websocket frames between `start` and
    /// `stop`.
    Tts {
        state: TtsState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },

    /// Final ASR transcript for the utterance just completed. Not part of
    /// the closed frame-type table, but unknown types are defined as
    /// forward-compatible (logged and ignored), so this rides alongside it
    /// rather than overloading `listen`'s direction.
    Transcript { text: String },

    Mcp {
        #[serde(flatten)]
        payload: serde_json::Value,
    },

    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    SentenceStart,
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_frame_round_trips_through_json() {
        let frame = ClientFrame::Hello {
            version: 1,
            transport: "websocket".into(),
            features: None,
            audio_params: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"hello\""));
        let back: ClientFrame = serde_json::from_str(&json).unwrap();
        match back {
            ClientFrame::Hello { version, .. } => assert_eq!(version, 1),
            _ => panic!("expected hello"),
        }
    }

    #[test]
    fn listen_frame_carries_optional_agent_and_session() {
        let json = r#"{"type":"listen","state":"start","agent_id":7,"session_id":"550e8400-e29b-41d4-a716-446655440000"}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::Listen { state, agent_id, session_id, .. } => {
                assert_eq!(state, ListenState::Start);
                assert_eq!(agent_id, Some(7));
                assert!(session_id.is_some());
            }
            _ => panic!("expected listen"),
        }
    }

    #[test]
    fn mcp_frame_passes_arbitrary_payload_opaquely() {
        let json = r#"{"type":"mcp","foo":"bar","n":1}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::Mcp { payload } => {
                assert_eq!(payload["foo"], "bar");
                assert_eq!(payload["n"], 1);
            }
            _ => panic!("expected mcp"),
        }
    }

    #[test]
    fn tts_control_frame_carries_no_audio_bytes() {
        let frame = ServerFrame::Tts {
            state: TtsState::Start,
            text: Some("你好".into()),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"state\":\"start\""));
        assert!(!json.contains("data"));
    }

    #[test]
    fn llm_finished_frame_omits_absent_fields() {
        let frame = ServerFrame::Llm {
            content: None,
            emotion: None,
            finished: Some(true),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("content"));
        assert!(json.contains("\"finished\":true"));
    }

    #[test]
    fn error_frame_carries_spec_field_names() {
        let frame = ServerFrame::Error {
            code: "busy_dropped".into(),
            message: "session already generating".into(),
            details: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"code\":\"busy_dropped\""));
    }
}
