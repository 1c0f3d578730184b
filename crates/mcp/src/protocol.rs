//! JSON-RPC 2.0 types for the MCP protocol, server side.
//!
//! Request ids are kept as raw JSON values: clients may use strings or
//! numbers and the response must echo whichever they sent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes plus the MCP transport-level ones.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Generic server error; used for "no valid session" style failures.
    pub const SERVER_ERROR: i64 = -32000;
    pub const SESSION_TERMINATED: i64 = -32001;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Incoming messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A JSON-RPC 2.0 request (has an `id` — expects a response).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 notification (no `id` — fire-and-forget).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params,
        }
    }
}

/// Classification of one element of a POST body.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// A client's answer to a server-initiated request.
    Response,
    Invalid(String),
}

impl IncomingMessage {
    pub fn classify(value: Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::Invalid("message must be a JSON object".into());
        };
        if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Self::Invalid("jsonrpc must be \"2.0\"".into());
        }
        let has_method = obj.get("method").is_some_and(Value::is_string);
        let has_id = obj.get("id").is_some_and(|id| id.is_string() || id.is_number());

        match (has_method, has_id) {
            (true, true) => serde_json::from_value(value)
                .map(Self::Request)
                .unwrap_or_else(|e| Self::Invalid(e.to_string())),
            (true, false) => serde_json::from_value(value)
                .map(Self::Notification)
                .unwrap_or_else(|e| Self::Invalid(e.to_string())),
            (false, true) if obj.contains_key("result") || obj.contains_key("error") => {
                Self::Response
            }
            _ => Self::Invalid("not a request, notification or response".into()),
        }
    }
}

/// `true` when the body is (or, for a batch, contains) an `initialize` call.
pub fn is_initialize_request(body: &Value) -> bool {
    match body {
        Value::Array(items) => items.iter().any(is_initialize_request),
        other => other.get("method").and_then(Value::as_str) == Some("initialize"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MCP-specific payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client or server identity exchanged during `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: Implementation,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: Value,
    pub server_info: Implementation,
}

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// A single content item in a `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

impl ToolCallContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".into(),
            text: text.into(),
        }
    }
}

/// Result payload of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ToolCallContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// A successful result carrying `value` both as structured content and
    /// as its JSON text rendering.
    pub fn structured(value: Value) -> Self {
        Self {
            content: vec![ToolCallContent::text(value.to_string())],
            structured_content: Some(value),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolCallContent::text(message)],
            structured_content: None,
            is_error: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_request_with_string_id() {
        let msg = IncomingMessage::classify(json!({
            "jsonrpc": "2.0", "id": "1", "method": "tools/list"
        }));
        match msg {
            IncomingMessage::Request(req) => {
                assert_eq!(req.id, json!("1"));
                assert_eq!(req.method, "tools/list");
                assert!(req.params.is_none());
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn classify_notification() {
        let msg = IncomingMessage::classify(json!({
            "jsonrpc": "2.0", "method": "notifications/initialized"
        }));
        assert!(matches!(msg, IncomingMessage::Notification(_)));
    }

    #[test]
    fn classify_client_response() {
        let msg = IncomingMessage::classify(json!({
            "jsonrpc": "2.0", "id": 7, "result": {}
        }));
        assert_eq!(msg, IncomingMessage::Response);
    }

    #[test]
    fn classify_rejects_wrong_version() {
        let msg = IncomingMessage::classify(json!({
            "jsonrpc": "1.0", "id": 1, "method": "ping"
        }));
        assert!(matches!(msg, IncomingMessage::Invalid(_)));
    }

    #[test]
    fn initialize_detection() {
        assert!(is_initialize_request(&json!({"method": "initialize"})));
        assert!(is_initialize_request(&json!([{"method": "ping"}, {"method": "initialize"}])));
        assert!(!is_initialize_request(&json!({"method": "tools/list"})));
        assert!(!is_initialize_request(&json!(null)));
    }

    #[test]
    fn failure_response_omits_result() {
        let resp = JsonRpcResponse::failure(
            Value::Null,
            JsonRpcError::new(codes::SERVER_ERROR, "Bad Request: No valid session ID provided"),
        );
        let value = resp.to_value();
        assert_eq!(value["error"]["code"], -32000);
        assert!(value.get("result").is_none());
        assert_eq!(value["id"], Value::Null);
    }

    #[test]
    fn call_tool_result_serializes_camel_case() {
        let value = serde_json::to_value(CallToolResult::structured(json!({"n": 3}))).unwrap();
        assert_eq!(value["structuredContent"]["n"], 3);
        assert_eq!(value["isError"], false);
        assert_eq!(value["content"][0]["type"], "text");
    }

    #[test]
    fn jsonrpc_error_display() {
        let err = JsonRpcError::new(codes::METHOD_NOT_FOUND, "Method not found");
        assert_eq!(format!("{err}"), "JSON-RPC error -32601: Method not found");
    }
}
