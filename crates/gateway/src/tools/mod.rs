//! MCP tools exposed by the gateway.
//!
//! Every tool resolves its session through the shared [`SessionStore`] and
//! waits for the session's start hook before touching session data.

pub mod guessing;
pub mod navigate;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use sg_mcp::{McpServer, ToolContext, ToolError};
use sg_sessions::{Session, SessionStore};

pub use guessing::{Guess, Imagine, IsLessThan, Reveal};
pub use navigate::NavigateTo;

/// Look up the calling session and wait for its initialization.
pub async fn require_session(
    store: &SessionStore,
    tool: &str,
    ctx: &ToolContext,
) -> Result<Arc<Session>, ToolError> {
    if ctx.session_id.is_empty() {
        return Err(ToolError::Failed(format!(
            "calling tool {tool} requires a session"
        )));
    }
    let session = store
        .get_session(&ctx.session_id)
        .ok_or_else(|| ToolError::Failed("invalid sessionId".into()))?;
    session.wait_until_initialized().await?;
    Ok(session)
}

pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Register the number-guessing tools, plus `navigateTo` when a browser is
/// configured.
pub fn register_tools(server: &mut McpServer, store: Arc<SessionStore>, navigate: Option<NavigateTo>) {
    server.register_tool(Arc::new(Imagine::new(store.clone())));
    server.register_tool(Arc::new(IsLessThan::new(store.clone())));
    server.register_tool(Arc::new(Guess::new(store.clone())));
    server.register_tool(Arc::new(Reveal::new(store)));
    if let Some(navigate) = navigate {
        server.register_tool(Arc::new(navigate));
    }
}


#[cfg(test)]
mod tests {
    use super::testing::NullTransport;
    use super::*;
    use sg_mcp::Notifier;
    use sg_sessions::SessionData;

    #[tokio::test]
    async fn require_session_rejects_missing_and_unknown() {
        let store = SessionStore::new();
        let anon = ToolContext::new("", Notifier::disconnected());
        let err = require_session(&store, "imagine", &anon).await.unwrap_err();
        assert_eq!(err.to_string(), "calling tool imagine requires a session");

        let ghost = ToolContext::new("ghost", Notifier::disconnected());
        let err = require_session(&store, "imagine", &ghost).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid sessionId");
    }

    #[tokio::test]
    async fn require_session_touches() {
        let store = SessionStore::new();
        let s = store
            .create_session("s", Arc::new(NullTransport), SessionData::new())
            .unwrap();
        let before = s.touched_at();
        let ctx = ToolContext::new("s", Notifier::disconnected());
        require_session(&store, "reveal", &ctx).await.unwrap();
        assert!(s.touched_at() > before);
    }

    #[test]
    fn registers_guessing_tools_without_browser() {
        let mut server = McpServer::new("t", "1", vec![]);
        register_tools(&mut server, Arc::new(SessionStore::new()), None);
        assert_eq!(server.tool_names(), vec!["imagine", "isLessThan", "guess", "reveal"]);
    }
}
