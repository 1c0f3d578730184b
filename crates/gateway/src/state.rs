use std::sync::Arc;
use std::time::Instant;

use sg_domain::config::Config;
use sg_mcp::TransportFactory;
use sg_sessions::{ExpirySweeper, SessionLifecycle, SessionStore};

/// Shared application state passed to all API handlers.
///
/// The session store is the only process-wide mutable state; everything else
/// here is either immutable or reaches the store through its own methods.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Session management ────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,
    pub lifecycle: Arc<SessionLifecycle>,
    pub sweeper: Arc<ExpirySweeper>,

    // ── Protocol ──────────────────────────────────────────────────────
    /// Allocates one transport per handshake candidate.
    pub transports: Arc<dyn TransportFactory>,

    pub started_at: Instant,
}
