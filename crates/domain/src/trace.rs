use serde::Serialize;

/// Structured trace events emitted across all sessiongate crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
    },
    SessionInitialized {
        session_id: String,
        ok: bool,
        duration_ms: u64,
    },
    SessionEnded {
        session_id: String,
        reason: String,
        hook_ok: bool,
    },
    HandshakeRejected {
        stage: String,
        problems: Vec<String>,
    },
    SweepCompleted {
        reclaimed: usize,
        failed: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sg_event");
    }
}
