pub mod error;
pub mod handshake;
pub mod health;
pub mod mcp;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use error::ApiError;
pub use mcp::SESSION_HEADER;

/// Build the gateway router: the MCP endpoint (path from
/// `server.endpoint`), `/health`, and a JSON 404 for everything else.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            &state.config.server.endpoint,
            get(mcp::handle_get)
                .post(mcp::handle_post)
                .delete(mcp::handle_delete),
        )
        .route("/health", get(health::health))
        .fallback(health::not_found)
        .layer(TraceLayer::new_for_http())
}
