//! AppState construction and background-task spawning extracted from `main.rs`.
//!
//! [`build_app_state`] wires the production collaborators from config;
//! [`assemble`] is the lower-level constructor tests use to inject their own
//! hooks and transports.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;

use sg_domain::config::{Config, ConfigSeverity};
use sg_mcp::{McpServer, StreamableTransportFactory, TransportFactory};
use sg_sessions::{ExpirySweeper, SessionHooks, SessionLifecycle, SessionStore};

use crate::services::{
    BrowserSessionHooks, HttpUploader, ScreenshotUploader, UrlAllowList, WebDriverLauncher,
};
use crate::state::AppState;
use crate::tools::{self, NavigateTo};

/// Validate config, build every collaborator and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let store = Arc::new(SessionStore::new());

    // ── Browser automation (optional) ────────────────────────────────
    let launcher =
        WebDriverLauncher::from_config(&config.browser).context("configuring WebDriver")?;
    let (hooks, navigate) = match launcher {
        Some(launcher) => {
            let uploader = HttpUploader::from_config(&config.storage)
                .context("configuring screenshot uploads")?
                .map(|u| Arc::new(u) as Arc<dyn ScreenshotUploader>);
            let allowlist = UrlAllowList::new(&config.browser.allowed_origins);
            tracing::info!(
                webdriver = config.browser.webdriver_url.as_deref().unwrap_or_default(),
                allowed_origins = config.browser.allowed_origins.len(),
                screenshots = uploader.is_some(),
                "browser automation enabled"
            );
            let hooks: Arc<dyn SessionHooks> =
                Arc::new(BrowserSessionHooks::new(Arc::new(launcher)));
            (
                Some(hooks),
                Some(NavigateTo::new(store.clone(), allowlist, uploader)),
            )
        }
        None => {
            tracing::info!("browser automation disabled (no [browser] webdriver_url)");
            (None, None)
        }
    };

    // ── MCP server & transports ──────────────────────────────────────
    let server = build_mcp_server(&config, store.clone(), navigate);
    tracing::info!(tools = ?server.tool_names(), "mcp server ready");
    let transports: Arc<dyn TransportFactory> = Arc::new(StreamableTransportFactory::new(
        Arc::new(server),
        config.mcp.response_mode,
    ));

    Ok(assemble(config, store, hooks, transports))
}

/// The protocol dispatcher with every tool registered.
pub fn build_mcp_server(
    config: &Config,
    store: Arc<SessionStore>,
    navigate: Option<NavigateTo>,
) -> McpServer {
    let mut server = McpServer::new(
        config.mcp.server_name.clone(),
        config.mcp.server_version.clone(),
        config.mcp.supported_protocol_versions.clone(),
    );
    tools::register_tools(&mut server, store, navigate);
    server
}

/// Tie the store, lifecycle and sweeper together around the given hooks
/// and transport factory.
pub fn assemble(
    config: Arc<Config>,
    store: Arc<SessionStore>,
    hooks: Option<Arc<dyn SessionHooks>>,
    transports: Arc<dyn TransportFactory>,
) -> AppState {
    let lifecycle = Arc::new(
        SessionLifecycle::new(store.clone(), hooks).with_hook_timeouts(
            config.sessions.start_hook_timeout(),
            config.sessions.end_hook_timeout(),
        ),
    );
    let sweeper = Arc::new(ExpirySweeper::new(
        lifecycle.clone(),
        config.sessions.lifetime(),
    ));
    AppState {
        config,
        sessions: store,
        lifecycle,
        sweeper,
        transports,
        started_at: Instant::now(),
    }
}

/// Spawn the long-running background tasks.
///
/// Call this **after** [`build_app_state`] when running the HTTP server.
/// Without `sessions.sweep_interval_secs` sessions are only swept after
/// request handling.
pub fn spawn_background_tasks(state: &AppState) {
    // ── Periodic expiry sweep ────────────────────────────────────────
    match state.config.sessions.sweep_interval_secs {
        Some(secs) => {
            state.sweeper.clone().spawn(Duration::from_secs(secs));
            tracing::info!(interval_secs = secs, "background session sweeper spawned");
        }
        None => tracing::info!("background session sweeper disabled; sweeping on requests only"),
    }
}
