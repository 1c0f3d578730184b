//! Strict checks on an `initialize` request, run before anything is
//! allocated for the new session.  Problems are collected, not
//! short-circuited, so the client sees them all at once.

use axum::http::{header, HeaderMap};
use serde_json::Value;

use sg_domain::config::HandshakeRules;
use sg_domain::trace::TraceEvent;

use super::error::ApiError;

/// Header problems, in a fixed order.  Empty when the headers are fine.
pub fn check_headers(headers: &HeaderMap) -> Vec<String> {
    let content_type = header_lowercase(headers, header::CONTENT_TYPE);
    let accept = header_lowercase(headers, header::ACCEPT);

    let mut problems = Vec::new();
    if !content_type.contains("application/json") {
        problems.push("content-type header must be application/json".to_string());
    }
    if !accept.contains("application/json") {
        problems.push("accept header must include application/json".to_string());
    }
    if !accept.contains("text/event-stream") {
        problems.push("accept header must include text/event-stream".to_string());
    }
    problems
}

fn header_lowercase(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",")
        .to_ascii_lowercase()
}

/// Envelope and params problems of an `initialize` body.
pub fn check_initialize(body: &Value, rules: &HandshakeRules) -> Vec<String> {
    let mut problems = Vec::new();
    let Some(obj) = body.as_object() else {
        problems.push("initialize call must be a single JSON object".to_string());
        return problems;
    };

    if !obj.contains_key("jsonrpc") {
        problems.push("initialize call must specify jsonrpc version".to_string());
    }
    if !obj.contains_key("id") {
        problems.push("initialize call must specify an id".to_string());
    }
    if obj.get("method").and_then(Value::as_str) != Some("initialize") {
        problems.push("method must be initialize".to_string());
    }

    let params = params_problems(obj.get("params"), rules);
    if !params.is_empty() {
        problems.push(format!("Invalid params for initialize: {}", params.join("\n")));
    }
    problems
}

fn params_problems(params: Option<&Value>, rules: &HandshakeRules) -> Vec<String> {
    let Some(params) = params.and_then(Value::as_object) else {
        return vec![r#"Missing or invalid "params": expected an object."#.to_string()];
    };

    let mut problems = Vec::new();
    let mut expect = |field: &str, ok: bool, kind: &str| {
        if !ok {
            problems.push(format!(r#"Missing or invalid "{field}": expected {kind}."#));
        }
    };

    expect(
        "protocolVersion",
        params.get("protocolVersion").is_some_and(Value::is_string),
        "a string",
    );
    expect(
        "capabilities",
        params.get("capabilities").is_some_and(Value::is_object),
        "an object",
    );
    match params.get("clientInfo").and_then(Value::as_object) {
        None => expect("clientInfo", false, "an object"),
        Some(info) => {
            expect(
                "clientInfo.name",
                info.get("name").is_some_and(Value::is_string),
                "a string",
            );
            expect(
                "clientInfo.version",
                info.get("version").is_some_and(Value::is_string),
                "a string",
            );
        }
    }
    if rules.require_tools_list {
        expect("tools", params.get("tools").is_some_and(Value::is_array), "an array");
    }
    problems
}

/// Run both checks.  Headers are reported first; body problems are only
/// looked at once the headers pass.
pub fn validate(headers: &HeaderMap, body: &Value, rules: &HandshakeRules) -> Result<(), ApiError> {
    let problems = check_headers(headers);
    if !problems.is_empty() {
        reject("headers", &problems);
        return Err(ApiError::InvalidHeaders(problems));
    }
    let problems = check_initialize(body, rules);
    if !problems.is_empty() {
        reject("body", &problems);
        return Err(ApiError::InvalidInitialize(problems));
    }
    Ok(())
}

fn reject(stage: &str, problems: &[String]) {
    TraceEvent::HandshakeRejected {
        stage: stage.into(),
        problems: problems.to_vec(),
    }
    .emit();
}
