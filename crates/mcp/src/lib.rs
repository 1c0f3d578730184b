//! `sg-mcp` — server side of the MCP (Model Context Protocol) streamable
//! HTTP transport.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types and the MCP payloads the gateway speaks.
//! - The [`SessionTransport`] abstraction the HTTP router forwards requests
//!   to, with a [`TransportListener`] for "session established" and
//!   "transport closed" notifications.
//! - [`StreamableTransport`], one per client session, which mints the
//!   session id during the `initialize` exchange.
//! - [`McpServer`], the method dispatcher and tool registry shared by all
//!   transports.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sg_mcp::{McpServer, StreamableTransportFactory, TransportFactory};
//!
//! let mut server = McpServer::new("sessiongate", "1.0.0", versions);
//! server.register_tool(Arc::new(MyTool));
//! let factory = StreamableTransportFactory::new(Arc::new(server), ResponseMode::Json);
//! let transport = factory.create(listener);
//! let response = transport.handle_request(request).await?;
//! ```

pub mod protocol;
pub mod server;
pub mod streamable;
pub mod transport;

// Re-exports for convenience.
pub use protocol::{JsonRpcError, JsonRpcResponse, ToolDefinition};
pub use server::{McpServer, Notifier, Tool, ToolContext, ToolError};
pub use streamable::{StreamableTransport, StreamableTransportFactory};
pub use transport::{
    HttpVerb, ResponseBody, SessionTransport, TransportError, TransportFactory,
    TransportListener, TransportRequest, TransportResponse,
};
