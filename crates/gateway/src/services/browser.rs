//! Per-session browser automation over the W3C WebDriver protocol.
//!
//! Each session gets its own browser, launched by the start hook and stored
//! under [`BROWSER`] in the session data; the end hook releases it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use sg_domain::config::BrowserConfig;
use sg_domain::error::{Error, Result};
use sg_sessions::{DataKey, Session, SessionHooks};

/// Session data slot owned by the browser hooks and the `navigateTo` tool.
pub const BROWSER: DataKey<Arc<dyn BrowserEngine>> = DataKey::new("browser");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// An interactive element found on the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
    pub selector: String,
}

#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;
    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;
    /// Interactive elements, optionally filtered by a free-text instruction.
    async fn observe(&self, instruction: Option<&str>) -> Result<Vec<Observation>>;
    /// Close the browser.  Releasing an already closed browser succeeds.
    async fn release(&self) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserEngine>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle hooks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct BrowserSessionHooks {
    launcher: Arc<dyn BrowserLauncher>,
}

impl BrowserSessionHooks {
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl SessionHooks for BrowserSessionHooks {
    async fn on_session_start(&self, session: Arc<Session>) -> Result<()> {
        if session.get(BROWSER).is_some() {
            return Err(Error::Hook(format!(
                "browser already initialized in session {}",
                session.id()
            )));
        }
        let browser = self.launcher.launch().await?;
        session.insert(BROWSER, browser);
        tracing::info!(session_id = %session.id(), "browser launched for session");
        Ok(())
    }

    async fn on_session_end(&self, session: Arc<Session>) -> Result<()> {
        if let Some(browser) = session.remove(BROWSER) {
            browser.release().await?;
            tracing::info!(session_id = %session.id(), "browser released");
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WebDriver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Collects visible interactive elements; `arguments[0]` is an optional
/// case-insensitive text filter.
const OBSERVE_SCRIPT: &str = r#"
const filter = (arguments[0] || '').toLowerCase();
const nodes = document.querySelectorAll('a, button, input, select, textarea, [role="button"]');
const out = [];
nodes.forEach((el, i) => {
  const text = (el.innerText || el.value || el.getAttribute('aria-label') || el.getAttribute('title') || '').trim();
  if (filter && !text.toLowerCase().includes(filter)) return;
  const tag = el.tagName.toLowerCase();
  const method = (tag === 'input' || tag === 'textarea') ? 'fill' : (tag === 'select' ? 'selectOption' : 'click');
  const selector = el.id ? '#' + el.id : tag + ':nth-of-type(' + (i + 1) + ')';
  out.push({ description: (tag + ' ' + text).trim(), method: method, selector: selector });
});
return out;
"#;

/// Slack on top of the page-load timeout for a single WebDriver command.
const WEBDRIVER_GRACE: Duration = Duration::from_secs(10);

pub struct WebDriverLauncher {
    client: reqwest::Client,
    base_url: String,
    headless: bool,
    page_load_timeout_ms: u64,
    request_timeout: Duration,
}

impl WebDriverLauncher {
    /// `Ok(None)` when no WebDriver endpoint is configured.
    pub fn from_config(cfg: &BrowserConfig) -> Result<Option<Self>> {
        let Some(base) = cfg.webdriver_url.as_ref() else {
            return Ok(None);
        };
        let request_timeout = Duration::from_millis(cfg.page_load_timeout_ms) + WEBDRIVER_GRACE;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Http(format!("building WebDriver client: {e}")))?;
        Ok(Some(Self {
            client,
            base_url: base.trim_end_matches('/').to_owned(),
            headless: cfg.headless,
            page_load_timeout_ms: cfg.page_load_timeout_ms,
            request_timeout,
        }))
    }

    fn capabilities(&self) -> Value {
        let mut chrome_args = vec!["--disable-gpu"];
        let mut firefox_args = Vec::new();
        if self.headless {
            chrome_args.push("--headless=new");
            firefox_args.push("-headless");
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "goog:chromeOptions": { "args": chrome_args },
                    "moz:firefoxOptions": { "args": firefox_args },
                    "timeouts": { "pageLoad": self.page_load_timeout_ms }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserEngine>> {
        let value = webdriver_call(
            &self.client,
            reqwest::Method::POST,
            &format!("{}/session", self.base_url),
            Some(self.capabilities()),
        )
        .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Browser("WebDriver returned no sessionId".into()))?;

        tracing::debug!(webdriver_session = %session_id, "WebDriver session created");
        Ok(Arc::new(WebDriverBrowser {
            client: self.client.clone(),
            session_url: format!("{}/session/{session_id}", self.base_url),
            released: AtomicBool::new(false),
        }))
    }
}

pub struct WebDriverBrowser {
    client: reqwest::Client,
    session_url: String,
    released: AtomicBool,
}

impl WebDriverBrowser {
    async fn call(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> Result<Value> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::Browser("browser already released".into()));
        }
        webdriver_call(&self.client, method, &format!("{}{path}", self.session_url), body).await
    }
}

#[async_trait]
impl BrowserEngine for WebDriverBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.call(reqwest::Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn current_url(&self) -> Result<String> {
        let value = self.call(reqwest::Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::Browser("current URL is not a string".into()))
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        let body = json!({ "width": viewport.width, "height": viewport.height });
        self.call(reqwest::Method::POST, "/window/rect", Some(body))
            .await
            .map(|_| ())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let value = self.call(reqwest::Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| Error::Browser("screenshot is not a string".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::Browser(format!("screenshot is not valid base64: {e}")))
    }

    async fn observe(&self, instruction: Option<&str>) -> Result<Vec<Observation>> {
        let body = json!({ "script": OBSERVE_SCRIPT, "args": [instruction] });
        let value = self
            .call(reqwest::Method::POST, "/execute/sync", Some(body))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match webdriver_call(&self.client, reqwest::Method::DELETE, &self.session_url, None).await {
            Ok(_) => Ok(()),
            Err(Error::Browser(msg)) if msg.contains("invalid session id") => {
                tracing::debug!("WebDriver session was already closed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Issue one WebDriver command and return its `value` member.
async fn webdriver_call(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value> {
    let mut req = client.request(method, url);
    if let Some(body) = body {
        req = req.json(&body);
    }
    let resp = req
        .send()
        .await
        .map_err(|e| Error::Http(format!("WebDriver request to {url} failed: {e}")))?;
    let status = resp.status();
    let payload: Value = resp
        .json()
        .await
        .map_err(|e| Error::Browser(format!("WebDriver returned malformed JSON: {e}")))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(Error::Browser(format!("{error}: {message}")));
    }
    Ok(value)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// In-memory browser that records what it was asked to do.
    #[derive(Default)]
    pub struct FakeBrowser {
        pub url: Mutex<String>,
        pub viewport: Mutex<Option<Viewport>>,
        pub releases: AtomicUsize,
    }

    #[async_trait]
    impl BrowserEngine for FakeBrowser {
        async fn navigate(&self, url: &str) -> Result<()> {
            *self.url.lock() = url.to_owned();
            Ok(())
        }
        async fn current_url(&self) -> Result<String> {
            Ok(self.url.lock().clone())
        }
        async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
            *self.viewport.lock() = Some(viewport);
            Ok(())
        }
        async fn screenshot(&self) -> Result<Vec<u8>> {
            Ok(b"\x89PNG".to_vec())
        }
        async fn observe(&self, instruction: Option<&str>) -> Result<Vec<Observation>> {
            Ok(vec![Observation {
                description: instruction.unwrap_or("everything").to_owned(),
                method: Some("click".into()),
                arguments: None,
                selector: "#main".into(),
            }])
        }
        async fn release(&self) -> Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeLauncher {
        pub launched: Mutex<Vec<Arc<FakeBrowser>>>,
    }

    #[async_trait]
    impl BrowserLauncher for FakeLauncher {
        async fn launch(&self) -> Result<Arc<dyn BrowserEngine>> {
            let browser = Arc::new(FakeBrowser::default());
            self.launched.lock().push(browser.clone());
            Ok(browser)
        }
    }
}
