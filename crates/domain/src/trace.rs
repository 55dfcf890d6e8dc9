use serde::Serialize;

/// Structured trace events emitted across the engine, logged alongside
/// `tracing` spans rather than in place of them — these are the
/// high-signal, machine-parseable subset worth grepping for in production
/// logs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnStarted {
        session_id: String,
        kind: String,
    },
    TurnCompleted {
        session_id: String,
        run_id: String,
        tool_loops: u32,
        duration_ms: u64,
    },
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmRetry {
        provider: String,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    ToolDispatched {
        tool_name: String,
        call_id: String,
        is_error: bool,
    },
    WorldMutated {
        session_id: String,
        mutation: String,
    },
    SimulationRun {
        session_id: String,
        depth: String,
        cohorts: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "tf_event");
    }
}
