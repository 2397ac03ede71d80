use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// One increment of a streaming module `callStream` invocation. Modules
/// that only support a blocking `call` emit a single `Token` followed by
/// `Done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text token (LLM) or partial transcript (ASR interim result).
    #[serde(rename = "token")]
    Token { text: String },

    /// A chunk of synthesized audio (TTS). Opaque bytes, codec is whatever
    /// the module was configured to emit.
    #[serde(rename = "audio")]
    Audio { data: Vec<u8> },

    /// An ASR final result, ending the utterance.
    #[serde(rename = "final_transcript")]
    FinalTranscript { text: String },

    #[serde(rename = "tool_call_started")]
    ToolCallStarted { call_id: String, tool_name: String },

    #[serde(rename = "tool_call_delta")]
    ToolCallDelta {
        call_id: String,
        arguments_fragment: String,
    },

    #[serde(rename = "tool_call_finished")]
    ToolCallFinished { call: ToolCall },

    #[serde(rename = "done")]
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    #[serde(rename = "error")]
    Error {
        error_kind: String,
        message: String,
        retriable: bool,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_event_is_not_terminal() {
        let ev = StreamEvent::Token {
            text: "hi".into(),
        };
        assert!(!ev.is_terminal());
    }

    #[test]
    fn done_and_error_events_are_terminal() {
        assert!(StreamEvent::Done { usage: None }.is_terminal());
        assert!(StreamEvent::Error {
            error_kind: "timeout".into(),
            message: "deadline exceeded".into(),
            retriable: true,
        }
        .is_terminal());
    }
}
