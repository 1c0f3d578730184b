//! MCP (Model Context Protocol) server-side configuration.
//!
//! These are lightweight config structs used to deserialize the `[mcp]`
//! section of the gateway config. The protocol engine itself lives in the
//! `sg-mcp` crate.

use serde::{Deserialize, Serialize};

/// Top-level MCP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// `serverInfo.name` reported in the `initialize` result.
    #[serde(default = "d_server_name")]
    pub server_name: String,

    /// `serverInfo.version` reported in the `initialize` result.
    #[serde(default = "d_server_version")]
    pub server_version: String,

    /// How POST responses are framed.
    #[serde(default)]
    pub response_mode: ResponseMode,

    /// Protocol versions the server accepts.  The first entry is the one
    /// offered when the client asks for something unsupported.
    #[serde(default = "d_protocol_versions")]
    pub supported_protocol_versions: Vec<String>,

    #[serde(default)]
    pub handshake: HandshakeRules,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            server_name: d_server_name(),
            server_version: d_server_version(),
            response_mode: ResponseMode::default(),
            supported_protocol_versions: d_protocol_versions(),
            handshake: HandshakeRules::default(),
        }
    }
}

/// Framing for protocol responses to POST requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// A plain `application/json` body.
    #[default]
    Json,
    /// A `text/event-stream` body carrying one `message` event per response.
    Sse,
}

/// Optional strictness rules for the `initialize` handshake.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HandshakeRules {
    /// Additionally require `params.tools` to be an array.
    #[serde(default)]
    pub require_tools_list: bool,
}

fn d_server_name() -> String {
    "sessiongate".into()
}
fn d_server_version() -> String {
    "1.0.0".into()
}
fn d_protocol_versions() -> Vec<String> {
    vec![
        "2025-06-18".into(),
        "2025-03-26".into(),
        "2024-11-05".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_mode_parses_lowercase() {
        let cfg: McpConfig = toml::from_str(r#"response_mode = "sse""#).unwrap();
        assert_eq!(cfg.response_mode, ResponseMode::Sse);
        assert!(!cfg.handshake.require_tools_list);
    }

    #[test]
    fn handshake_rules_toggle() {
        let cfg: McpConfig = toml::from_str(
            r#"
            [handshake]
            require_tools_list = true
        "#,
        )
        .unwrap();
        assert!(cfg.handshake.require_tools_list);
        assert_eq!(cfg.server_name, "sessiongate");
    }
}
