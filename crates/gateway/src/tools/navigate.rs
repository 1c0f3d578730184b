//! `navigateTo`: drive the session's browser to an allow-listed URL,
//! optionally capturing a screenshot and the page's interactive elements.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use sg_domain::error::Error;
use sg_mcp::{Tool, ToolContext, ToolDefinition, ToolError};
use sg_sessions::SessionStore;

use super::{parse_args, require_session};
use crate::services::browser::{Observation, Viewport, BROWSER};
use crate::services::{ScreenshotUploader, UrlAllowList};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ObservationRequest {
    Flag(bool),
    Instruction(String),
}

impl ObservationRequest {
    /// `None` when no observation was asked for, `Some(None)` to observe
    /// everything, `Some(Some(text))` to observe what `text` describes.
    fn instruction(&self) -> Option<Option<&str>> {
        match self {
            Self::Flag(false) => None,
            Self::Flag(true) => Some(None),
            Self::Instruction(s) if s.is_empty() => None,
            Self::Instruction(s) if s.eq_ignore_ascii_case("true") => Some(None),
            Self::Instruction(s) => Some(Some(s.as_str())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigateArgs {
    url: String,
    #[serde(default)]
    screenshot: Option<Viewport>,
    #[serde(default)]
    observations: Option<ObservationRequest>,
    /// Milliseconds to wait before taking the screenshot.
    #[serde(default)]
    wait_for_load: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NavigateResult {
    current_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    screenshot_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    observations: Option<Vec<Observation>>,
}

pub struct NavigateTo {
    store: Arc<SessionStore>,
    allowlist: UrlAllowList,
    uploader: Option<Arc<dyn ScreenshotUploader>>,
}

impl NavigateTo {
    pub fn new(
        store: Arc<SessionStore>,
        allowlist: UrlAllowList,
        uploader: Option<Arc<dyn ScreenshotUploader>>,
    ) -> Self {
        Self {
            store,
            allowlist,
            uploader,
        }
    }
}

#[async_trait]
impl Tool for NavigateTo {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "navigateTo".into(),
            description: "Navigate the session's browser to a URL, optionally returning a \
                          screenshot URL and observed page elements"
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string" },
                    "screenshot": {
                        "type": "object",
                        "properties": {
                            "width": { "type": "number" },
                            "height": { "type": "number" }
                        },
                        "required": ["width", "height"]
                    },
                    "observations": { "type": ["boolean", "string"] },
                    "waitForLoad": { "type": "number" }
                },
                "required": ["url"]
            }),
            output_schema: Some(json!({
                "type": "object",
                "properties": {
                    "currentUrl": { "type": "string" },
                    "screenshotUrl": { "type": "string" },
                    "observations": { "type": "array" }
                },
                "required": ["currentUrl"]
            })),
        }
    }

    async fn call(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: NavigateArgs = parse_args(arguments)?;
        let session = require_session(&self.store, "navigateTo", ctx).await?;

        let browser = session.get(BROWSER).ok_or_else(|| {
            ToolError::Failed(format!("browser not initialized in session {}", session.id()))
        })?;
        if !self.allowlist.is_allowed(&args.url) {
            return Err(Error::UrlNotAllowed(args.url).into());
        }

        if let Some(viewport) = args.screenshot {
            browser.set_viewport(viewport).await?;
        }
        let started = std::time::Instant::now();
        browser.navigate(&args.url).await?;
        tracing::debug!(
            session_id = %session.id(),
            url = %args.url,
            duration_ms = started.elapsed().as_millis() as u64,
            "navigation finished"
        );

        let mut result = NavigateResult {
            current_url: browser.current_url().await?,
            screenshot_url: None,
            observations: None,
        };

        if args.screenshot.is_some() {
            let uploader = self
                .uploader
                .as_ref()
                .ok_or_else(|| ToolError::Failed("screenshot storage is not configured".into()))?;
            if let Some(ms) = args.wait_for_load.filter(|ms| *ms > 0) {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            let png = browser.screenshot().await?;
            result.screenshot_url = Some(uploader.upload_screenshot(png, &args.url).await?);
        }

        if let Some(instruction) = args.observations.as_ref().and_then(|o| o.instruction()) {
            result.observations = Some(browser.observe(instruction).await?);
        }

        serde_json::to_value(result).map_err(|e| ToolError::Failed(e.to_string()))
    }
}
