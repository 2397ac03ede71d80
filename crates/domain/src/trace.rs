use serde::Serialize;

/// Structured trace events emitted across the gateway crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_id: String,
        agent_id: i64,
        is_new: bool,
    },
    SessionSupplanted {
        session_id: String,
        old_client_id: String,
        new_client_id: String,
    },
    StateTransition {
        session_id: String,
        from: String,
        to: String,
    },
    BargeIn {
        session_id: String,
        previous_state: String,
    },
    ModuleCall {
        module_type: String,
        module_code: String,
        tool_name: String,
        duration_ms: u64,
        is_error: bool,
    },
    ModuleInitFailed {
        module_type: String,
        module_code: String,
        message: String,
        retriable: bool,
    },
    CompactionRun {
        agent_id: i64,
        copilot_mode: bool,
        messages_compacted: usize,
    },
    GrowthSummaryCompleted {
        agent_id: i64,
        date: String,
        summary_type: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "gateway_event");
    }
}
