//! Error responses of the MCP endpoint.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use sg_mcp::protocol::codes;

/// Everything the endpoint can refuse a request with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request headers: [{}]", .0.join(", "))]
    InvalidHeaders(Vec<String>),

    #[error("Invalid initialize call: {}", .0.join(", "))]
    InvalidInitialize(Vec<String>),

    /// A session header was sent but names no live session.
    #[error("Bad Request: Session not found or expired")]
    UnknownSession(String),

    /// No session header and the body is not an `initialize` call.
    #[error("Bad Request: No valid session ID provided")]
    MissingSession,

    #[error("Parse error: {0}")]
    InvalidJson(String),

    /// GET and DELETE answer session problems in plain text.
    #[error("Invalid or missing session ID")]
    SessionPlainText,

    /// The end hook failed.  The session is gone regardless.
    #[error("{0}")]
    Teardown(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Teardown(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        match self {
            Self::SessionPlainText => {
                (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], message)
                    .into_response()
            }
            Self::MissingSession => jsonrpc_error(status, codes::SERVER_ERROR, message),
            Self::InvalidJson(_) => jsonrpc_error(status, codes::PARSE_ERROR, message),
            Self::InvalidHeaders(_) => coded_error(status, 40000, message),
            Self::InvalidInitialize(_) => coded_error(status, 40001, message),
            Self::UnknownSession(id) => {
                tracing::debug!(session_id = %id, "request for unknown session");
                coded_error(status, 40004, message)
            }
            Self::Teardown(_) => coded_error(status, 50001, message),
            Self::Internal(_) => coded_error(status, 50000, message),
        }
    }
}

fn coded_error(status: StatusCode, code: i64, message: String) -> Response {
    (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
}

fn jsonrpc_error(status: StatusCode, code: i64, message: String) -> Response {
    (
        status,
        Json(json!({
            "jsonrpc": "2.0",
            "error": { "code": code, "message": message },
            "id": null,
        })),
    )
        .into_response()
}
