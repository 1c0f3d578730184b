//! Streamable HTTP transport: one instance per client session.
//!
//! The transport owns the session id.  It is minted while processing the
//! `initialize` request and announced to the [`TransportListener`] before the
//! handshake response leaves, so the router can register the session first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use sg_domain::config::ResponseMode;

use crate::protocol::{codes, is_initialize_request, IncomingMessage, JsonRpcError, JsonRpcResponse};
use crate::server::{McpServer, Notifier, ToolContext};
use crate::transport::{
    EventStream, HttpVerb, ResponseBody, SessionTransport, TransportError, TransportFactory,
    TransportListener, TransportRequest, TransportResponse,
};

const NOTIFICATION_BUFFER: usize = 64;

enum StreamStep {
    Item(Value),
    Skip,
    End,
}

pub struct StreamableTransport {
    server: Arc<McpServer>,
    mode: ResponseMode,
    listener: Arc<dyn TransportListener>,
    self_ref: Weak<StreamableTransport>,
    session_id: OnceLock<String>,
    /// Held for the whole of a POST so one session's requests run in order.
    request_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    notifications: Mutex<Option<broadcast::Sender<Value>>>,
    shutdown: watch::Sender<bool>,
}

impl StreamableTransport {
    pub fn new(
        server: Arc<McpServer>,
        mode: ResponseMode,
        listener: Arc<dyn TransportListener>,
    ) -> Arc<Self> {
        let (tx, _) = broadcast::channel(NOTIFICATION_BUFFER);
        let (shutdown, _) = watch::channel(false);
        Arc::new_cyclic(|weak| Self {
            server,
            mode,
            listener,
            self_ref: weak.clone(),
            session_id: OnceLock::new(),
            request_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            notifications: Mutex::new(Some(tx)),
            shutdown,
        })
    }

    fn notifier(&self) -> Notifier {
        match self.notifications.lock().as_ref() {
            Some(tx) => Notifier::new(tx.clone()),
            None => Notifier::disconnected(),
        }
    }

    fn context(&self) -> ToolContext {
        let id = self.session_id.get().cloned().unwrap_or_default();
        ToolContext::new(id, self.notifier())
    }

    fn reply(&self, status: u16, body: ResponseBody) -> TransportResponse {
        TransportResponse::new(status, self.session_id.get().cloned(), body)
    }

    fn error_reply(&self, status: u16, code: i64, message: &str) -> TransportResponse {
        let body = JsonRpcResponse::failure(Value::Null, JsonRpcError::new(code, message));
        self.reply(status, ResponseBody::Json(body.to_value()))
    }

    /// Mint the session id and announce it.  Runs only after the server
    /// accepted the `initialize` call.
    fn establish(&self) -> Result<(), TransportError> {
        let me = self.self_ref.upgrade().ok_or(TransportError::Closed)?;
        let id = uuid::Uuid::new_v4().to_string();
        self.listener
            .on_session_initialized(&id, me)
            .map_err(|e| TransportError::Registration(e.to_string()))?;
        self.session_id
            .set(id)
            .map_err(|_| TransportError::Registration("session already established".into()))?;
        Ok(())
    }

    async fn handle_post(&self, body: Value) -> Result<TransportResponse, TransportError> {
        let _guard = self.request_lock.lock().await;

        let (items, is_batch) = match body {
            Value::Array(items) => (items, true),
            other => (vec![other], false),
        };
        if items.is_empty() {
            return Ok(self.error_reply(
                400,
                codes::INVALID_REQUEST,
                "Invalid Request: empty batch",
            ));
        }

        let has_initialize = items.iter().any(is_initialize_request);
        if has_initialize {
            if self.session_id.get().is_some() {
                return Ok(self.error_reply(
                    400,
                    codes::INVALID_REQUEST,
                    "Invalid Request: Server already initialized",
                ));
            }
            if items.len() > 1 {
                return Ok(self.error_reply(
                    400,
                    codes::INVALID_REQUEST,
                    "Invalid Request: Only one initialization request is allowed",
                ));
            }
        } else if self.session_id.get().is_none() {
            return Ok(self.error_reply(
                400,
                codes::SERVER_ERROR,
                "Bad Request: Server not initialized",
            ));
        }

        let mut responses = Vec::new();
        for item in items {
            match IncomingMessage::classify(item) {
                IncomingMessage::Request(req) => {
                    let is_init = req.method == "initialize";
                    let response = self.server.handle_request(req, &self.context()).await;
                    if is_init && !response.is_error() {
                        self.establish()?;
                    }
                    responses.push(response.to_value());
                }
                IncomingMessage::Notification(n) => {
                    self.server.handle_notification(&n, &self.context());
                }
                IncomingMessage::Response => {}
                IncomingMessage::Invalid(reason) => {
                    let error = JsonRpcError::new(
                        codes::INVALID_REQUEST,
                        format!("Invalid Request: {reason}"),
                    );
                    responses.push(JsonRpcResponse::failure(Value::Null, error).to_value());
                }
            }
        }

        if responses.is_empty() {
            return Ok(self.reply(202, ResponseBody::Empty));
        }

        let body = match self.mode {
            ResponseMode::Json if is_batch => ResponseBody::Json(Value::Array(responses)),
            ResponseMode::Json => ResponseBody::Json(responses.remove(0)),
            ResponseMode::Sse => {
                let stream: EventStream = Box::pin(async_stream::stream! {
                    for response in responses {
                        yield response;
                    }
                });
                ResponseBody::Events(stream)
            }
        };
        Ok(self.reply(200, body))
    }

    /// Standalone stream of server notifications, ends when the transport
    /// closes.
    fn handle_get(&self) -> TransportResponse {
        if self.session_id.get().is_none() {
            return self.error_reply(400, codes::SERVER_ERROR, "Bad Request: Server not initialized");
        }
        let Some(mut rx) = self.notifications.lock().as_ref().map(|tx| tx.subscribe()) else {
            return self.error_reply(404, codes::SESSION_TERMINATED, "Session terminated");
        };
        let mut shutdown = self.shutdown.subscribe();

        let stream: EventStream = Box::pin(async_stream::stream! {
            loop {
                let next = tokio::select! {
                    msg = rx.recv() => match msg {
                        Ok(value) => StreamStep::Item(value),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "notification stream lagged");
                            StreamStep::Skip
                        }
                        Err(broadcast::error::RecvError::Closed) => StreamStep::End,
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            StreamStep::End
                        } else {
                            StreamStep::Skip
                        }
                    }
                };
                match next {
                    StreamStep::Item(value) => yield value,
                    StreamStep::Skip => {}
                    StreamStep::End => break,
                }
            }
        });
        self.reply(200, ResponseBody::Events(stream))
    }
}

#[async_trait]
impl SessionTransport for StreamableTransport {
    fn session_id(&self) -> Option<String> {
        self.session_id.get().cloned()
    }

    async fn handle_request(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        if self.is_closed() {
            return Ok(self.error_reply(404, codes::SESSION_TERMINATED, "Session terminated"));
        }
        match request.verb {
            HttpVerb::Post => {
                let body = request
                    .body
                    .ok_or_else(|| TransportError::Unsupported("POST without a body".into()))?;
                self.handle_post(body).await
            }
            HttpVerb::Get => Ok(self.handle_get()),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.notifications.lock().take();
        self.shutdown.send_replace(true);

        if let Some(id) = self.session_id.get() {
            tracing::debug!(session_id = %id, "transport closed");
            self.listener.on_closed(id);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Factory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StreamableTransportFactory {
    server: Arc<McpServer>,
    mode: ResponseMode,
}

impl StreamableTransportFactory {
    pub fn new(server: Arc<McpServer>, mode: ResponseMode) -> Self {
        Self { server, mode }
    }
}

impl TransportFactory for StreamableTransportFactory {
    fn create(&self, listener: Arc<dyn TransportListener>) -> Arc<dyn SessionTransport> {
        StreamableTransport::new(self.server.clone(), self.mode, listener)
    }
}
