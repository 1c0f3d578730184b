use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Browser automation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-session browser settings.  The browser tool and the browser
/// lifecycle hooks are only wired up when `webdriver_url` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Base URL of a WebDriver endpoint (chromedriver, geckodriver, ...).
    #[serde(default)]
    pub webdriver_url: Option<String>,

    /// Origins the browser may navigate to.  Empty denies everything.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "d_true")]
    pub headless: bool,

    #[serde(default = "d_page_load_timeout_ms")]
    pub page_load_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: None,
            allowed_origins: Vec::new(),
            headless: true,
            page_load_timeout_ms: d_page_load_timeout_ms(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_page_load_timeout_ms() -> u64 {
    30_000
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Screenshot storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Object storage used for screenshot uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Objects are `PUT` to `{upload_base_url}/{key}`.  `None` disables
    /// screenshot uploads.
    #[serde(default)]
    pub upload_base_url: Option<String>,

    /// Public URLs are returned as `{public_url_prefix}/{key}`.
    #[serde(default)]
    pub public_url_prefix: String,

    /// Prefix prepended to every object key (e.g. `"screenshots/"`).
    #[serde(default)]
    pub key_prefix: String,

    /// Environment variable holding a bearer token for uploads.
    #[serde(default = "d_token_env")]
    pub token_env: String,

    /// Per-request timeout for uploads.
    #[serde(default = "d_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_base_url: None,
            public_url_prefix: String::new(),
            key_prefix: String::new(),
            token_env: d_token_env(),
            upload_timeout_ms: d_upload_timeout_ms(),
        }
    }
}

fn d_token_env() -> String {
    "SG_STORAGE_TOKEN".into()
}
fn d_upload_timeout_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_disabled_by_default() {
        let cfg: BrowserConfig = toml::from_str("").unwrap();
        assert!(cfg.webdriver_url.is_none());
        assert!(cfg.allowed_origins.is_empty());
        assert!(cfg.headless);
    }

    #[test]
    fn storage_parses() {
        let cfg: StorageConfig = toml::from_str(
            r#"
            upload_base_url = "https://bucket.example.com"
            public_url_prefix = "https://cdn.example.com"
            key_prefix = "shots/"
        "#,
        )
        .unwrap();
        assert_eq!(cfg.upload_base_url.as_deref(), Some("https://bucket.example.com"));
        assert_eq!(cfg.key_prefix, "shots/");
        assert_eq!(cfg.token_env, "SG_STORAGE_TOKEN");
        assert_eq!(cfg.upload_timeout_ms, 30_000);
    }
}
