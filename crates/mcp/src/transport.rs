//! Transport abstraction between the HTTP router and the protocol engine.
//!
//! One transport is bound to one client session.  The router hands it the
//! decoded HTTP request and renders whatever [`TransportResponse`] comes
//! back; the transport never sees axum types.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use serde_json::Value;

/// HTTP verbs the router forwards to a transport.  DELETE is handled by
/// the session lifecycle and never reaches the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVerb {
    Post,
    Get,
}

/// A decoded request on the protocol endpoint.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub verb: HttpVerb,
    /// Parsed JSON body (POST only).
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn post(body: Value) -> Self {
        Self {
            verb: HttpVerb::Post,
            body: Some(body),
        }
    }

    pub fn get() -> Self {
        Self {
            verb: HttpVerb::Get,
            body: None,
        }
    }
}

/// A stream of JSON-RPC messages rendered as server-sent events.
pub type EventStream = Pin<Box<dyn Stream<Item = Value> + Send>>;

pub enum ResponseBody {
    Empty,
    Json(Value),
    Events(EventStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Events(_) => f.write_str("Events(..)"),
        }
    }
}

/// What the transport wants the router to send back.
#[derive(Debug)]
pub struct TransportResponse {
    pub status: u16,
    /// Echoed in the session header once the session is established.
    pub session_id: Option<String>,
    pub body: ResponseBody,
}

impl TransportResponse {
    pub fn new(status: u16, session_id: Option<String>, body: ResponseBody) -> Self {
        Self {
            status,
            session_id,
            body,
        }
    }

    /// Take the JSON body, if any.  Handy in tests.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Trait for the per-session protocol transport.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// The session id, once the `initialize` exchange has minted one.
    fn session_id(&self) -> Option<String>;

    /// Process one HTTP request addressed to this session.
    async fn handle_request(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError>;

    /// Close the transport.  Calling it more than once is a no-op.
    async fn close(&self) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;
}

/// Callbacks a transport fires at the edges of its life.
pub trait TransportListener: Send + Sync {
    /// The transport minted `session_id` and is about to acknowledge the
    /// handshake.  An error aborts the handshake.
    fn on_session_initialized(
        &self,
        session_id: &str,
        transport: Arc<dyn SessionTransport>,
    ) -> Result<(), TransportError>;

    /// The transport closed.  Best-effort: not every close path is
    /// guaranteed to reach this callback.
    fn on_closed(&self, session_id: &str);
}

/// Allocates a fresh transport for every handshake candidate.
pub trait TransportFactory: Send + Sync {
    fn create(&self, listener: Arc<dyn TransportListener>) -> Arc<dyn SessionTransport>;
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport is closed")]
    Closed,

    #[error("session registration failed: {0}")]
    Registration(String),

    #[error("unsupported request: {0}")]
    Unsupported(String),
}
