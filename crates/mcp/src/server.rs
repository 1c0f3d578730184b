//! MCP method dispatch and the tool registry.
//!
//! One [`McpServer`] is shared by every session transport.  It is stateless
//! with respect to sessions: anything a tool needs to remember lives in the
//! session's data bag, reached through the tool's own handles.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::protocol::{
    codes, CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ToolDefinition,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors a tool can return from [`Tool::call`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The arguments did not match the tool's input schema.  Surfaces as a
    /// JSON-RPC `-32602` error.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool ran and failed.  Surfaces as an `isError: true` result.
    #[error("{0}")]
    Failed(String),
}

impl From<sg_domain::error::Error> for ToolError {
    fn from(e: sg_domain::error::Error) -> Self {
        Self::Failed(e.to_string())
    }
}

/// Sends server-initiated notifications to the session's GET stream.
#[derive(Clone, Default)]
pub struct Notifier {
    tx: Option<broadcast::Sender<Value>>,
}

impl Notifier {
    pub fn new(tx: broadcast::Sender<Value>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A notifier that drops everything.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Returns `true` if at least one stream received the notification.
    pub fn notify(&self, method: &str, params: Option<Value>) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        let message = JsonRpcNotification::new(method, params);
        match serde_json::to_value(&message) {
            Ok(value) => tx.send(value).is_ok(),
            Err(_) => false,
        }
    }
}

/// Per-call context handed to a tool.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub notifier: Notifier,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, notifier: Notifier) -> Self {
        Self {
            session_id: session_id.into(),
            notifier,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpServer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct McpServer {
    info: Implementation,
    supported_versions: Vec<String>,
    tools: Vec<Arc<dyn Tool>>,
}

impl McpServer {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        supported_versions: Vec<String>,
    ) -> Self {
        Self {
            info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            supported_versions,
            tools: Vec::new(),
        }
    }

    /// Register a tool.  A later registration with the same name replaces
    /// the earlier one.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.tools.retain(|t| t.definition().name != name);
        self.tools.push(tool);
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.definition().name).collect()
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.definition().name == name)
    }

    /// Pick the protocol version to answer with: the client's if supported,
    /// otherwise our preferred one.
    fn negotiate_version(&self, requested: &str) -> String {
        if self.supported_versions.iter().any(|v| v == requested) {
            return requested.to_owned();
        }
        self.supported_versions
            .first()
            .cloned()
            .unwrap_or_else(|| requested.to_owned())
    }

    /// Dispatch one request and produce its response.
    pub async fn handle_request(&self, req: JsonRpcRequest, ctx: &ToolContext) -> JsonRpcResponse {
        let id = req.id.clone();
        let outcome = match req.method.as_str() {
            "initialize" => self.initialize(req.params),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(req.params, ctx).await,
            other => {
                tracing::debug!(method = %other, "unknown MCP method");
                Err(JsonRpcError::new(
                    codes::METHOD_NOT_FOUND,
                    format!("Method not found: {other}"),
                ))
            }
        };
        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        }
    }

    pub fn handle_notification(&self, notification: &JsonRpcNotification, ctx: &ToolContext) {
        tracing::debug!(
            session_id = %ctx.session_id,
            method = %notification.method,
            "MCP notification received"
        );
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| {
                JsonRpcError::new(codes::INVALID_PARAMS, format!("Invalid initialize params: {e}"))
            })?;

        tracing::info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol_version = %params.protocol_version,
            "MCP initialize"
        );

        let result = InitializeResult {
            protocol_version: self.negotiate_version(&params.protocol_version),
            capabilities: json!({ "tools": { "listChanged": false } }),
            server_info: self.info.clone(),
        };
        serde_json::to_value(result)
            .map_err(|e| JsonRpcError::new(codes::INTERNAL_ERROR, e.to_string()))
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<ToolDefinition> = self.tools.iter().map(|t| t.definition()).collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Option<Value>, ctx: &ToolContext) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| JsonRpcError::new(codes::INVALID_PARAMS, format!("Invalid tool call: {e}")))?;

        let tool = self.find_tool(&params.name).ok_or_else(|| {
            JsonRpcError::new(codes::INVALID_PARAMS, format!("Unknown tool: {}", params.name))
        })?;

        let arguments = params.arguments.unwrap_or_else(|| json!({}));
        let result = match tool.call(arguments, ctx).await {
            Ok(value) => CallToolResult::structured(value),
            Err(ToolError::InvalidArguments(msg)) => {
                return Err(JsonRpcError::new(codes::INVALID_PARAMS, msg));
            }
            Err(ToolError::Failed(msg)) => {
                tracing::warn!(
                    session_id = %ctx.session_id,
                    tool = %params.name,
                    error = %msg,
                    "tool call failed"
                );
                CallToolResult::error(msg)
            }
        };
        serde_json::to_value(result)
            .map_err(|e| JsonRpcError::new(codes::INTERNAL_ERROR, e.to_string()))
    }
}
