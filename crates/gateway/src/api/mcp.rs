//! The single MCP endpoint.
//!
//! - `POST`: handshake (no session header, `initialize` body) or a call
//!   on an existing session
//! - `GET`: server-to-client stream of an existing session
//! - `DELETE`: explicit session teardown

use std::convert::Infallible;
use std::sync::{Arc, Weak};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;

use sg_mcp::protocol::is_initialize_request;
use sg_mcp::{
    ResponseBody, SessionTransport, TransportError, TransportListener, TransportRequest,
    TransportResponse,
};
use sg_sessions::{EndReason, InitTicket, Session, SessionLifecycle};

use super::error::ApiError;
use super::handshake;
use crate::state::AppState;

/// Request and response header carrying the session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
}

/// The live session named by the request header.  The lookup touches it.
fn resolve(state: &AppState, headers: &HeaderMap) -> Option<Arc<Session>> {
    session_id(headers).and_then(|id| state.sessions.get_session(id))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn handle_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let message: Value =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidJson(e.to_string()))?;

    if let Some(id) = session_id(&headers) {
        let session = state
            .sessions
            .get_session(id)
            .ok_or_else(|| ApiError::UnknownSession(id.to_owned()))?;
        let response = forward(&session, TransportRequest::post(message)).await?;
        return Ok(render(response));
    }

    if !is_initialize_request(&message) {
        return Err(ApiError::MissingSession);
    }

    handshake::validate(&headers, &message, &state.config.mcp.handshake)?;
    let response = open_session(&state, message).await?;
    state.sweeper.sweep().await;
    Ok(render(response))
}

/// Allocate a transport for a validated handshake and let it complete the
/// exchange.  The session is registered from inside the transport, at the
/// moment it mints the id.
async fn open_session(state: &AppState, handshake: Value) -> Result<TransportResponse, ApiError> {
    let listener = Arc::new(RouterListener::new(&state.lifecycle));
    let transport = state.transports.create(listener.clone());

    let response = transport
        .handle_request(TransportRequest::post(handshake))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if let Some(ticket) = listener.take_ticket() {
        let session_id = ticket.session().id().to_owned();
        let init = state.lifecycle.begin_initialization(ticket);
        if state.config.sessions.await_start_hook {
            if let Err(e) = init.await {
                tracing::error!(session_id = %session_id, error = %e, "start hook task failed");
            }
        }
    }

    match &response.session_id {
        Some(id) => tracing::info!(session_id = %id, "session established"),
        None => tracing::debug!(status = response.status, "handshake did not establish a session"),
    }
    Ok(response)
}

async fn forward(
    session: &Arc<Session>,
    request: TransportRequest,
) -> Result<TransportResponse, ApiError> {
    session
        .transport()
        .handle_request(request)
        .await
        .map_err(|e| match e {
            TransportError::Closed => ApiError::UnknownSession(session.id().to_owned()),
            other => ApiError::Internal(other.to_string()),
        })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn handle_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let session = resolve(&state, &headers).ok_or(ApiError::SessionPlainText)?;
    let response = session
        .transport()
        .handle_request(TransportRequest::get())
        .await
        .map_err(|e| match e {
            TransportError::Closed => ApiError::SessionPlainText,
            other => ApiError::Internal(other.to_string()),
        })?;
    state.sweeper.sweep().await;
    Ok(render(response))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let session = resolve(&state, &headers).ok_or(ApiError::SessionPlainText)?;
    tracing::info!(session_id = %session.id(), "client requested teardown");

    let outcome = state
        .lifecycle
        .end_session(&session, EndReason::ClientTeardown)
        .await;
    state.sweeper.sweep().await;

    match outcome {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(ApiError::Teardown(e.to_string())),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport callbacks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bridges one transport's callbacks into the session lifecycle.
struct RouterListener {
    lifecycle: Weak<SessionLifecycle>,
    ticket: Mutex<Option<InitTicket>>,
}

impl RouterListener {
    fn new(lifecycle: &Arc<SessionLifecycle>) -> Self {
        Self {
            lifecycle: Arc::downgrade(lifecycle),
            ticket: Mutex::new(None),
        }
    }

    fn take_ticket(&self) -> Option<InitTicket> {
        self.ticket.lock().take()
    }
}

impl TransportListener for RouterListener {
    fn on_session_initialized(
        &self,
        session_id: &str,
        transport: Arc<dyn SessionTransport>,
    ) -> Result<(), TransportError> {
        let lifecycle = self
            .lifecycle
            .upgrade()
            .ok_or_else(|| TransportError::Registration("gateway is shutting down".into()))?;
        let (_, ticket) = lifecycle
            .register(session_id, transport)
            .map_err(|e| TransportError::Registration(e.to_string()))?;
        *self.ticket.lock() = ticket;
        Ok(())
    }

    /// Best-effort hint.  Teardown is idempotent, so this is a no-op when
    /// DELETE or the sweeper got there first.
    fn on_closed(&self, session_id: &str) {
        let Some(lifecycle) = self.lifecycle.upgrade() else {
            return;
        };
        let id = session_id.to_owned();
        tokio::spawn(async move {
            match lifecycle.end_session_by_id(&id, EndReason::TransportClosed).await {
                Ok(true) => tracing::debug!(session_id = %id, "session ended after transport closed"),
                Ok(false) => {}
                Err(e) => tracing::warn!(session_id = %id, error = %e, "teardown after transport close failed"),
            }
        });
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn render(response: TransportResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut out = match response.body {
        ResponseBody::Empty => status.into_response(),
        ResponseBody::Json(value) => (status, Json(value)).into_response(),
        ResponseBody::Events(stream) => {
            let events = stream.map(|message| {
                Ok::<_, Infallible>(Event::default().event("message").data(message.to_string()))
            });
            (status, Sse::new(events).keep_alive(KeepAlive::default())).into_response()
        }
    };

    if let Some(id) = response.session_id {
        match HeaderValue::from_str(&id) {
            Ok(value) => {
                out.headers_mut().insert(SESSION_HEADER, value);
            }
            Err(e) => tracing::error!(session_id = %id, error = %e, "session id is not a valid header value"),
        }
    }
    out
}
