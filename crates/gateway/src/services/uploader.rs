//! Screenshot upload to object storage over plain HTTP `PUT`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use sg_domain::config::StorageConfig;
use sg_domain::error::{Error, Result};

#[async_trait]
pub trait ScreenshotUploader: Send + Sync {
    /// Store `png` (captured at `page_url`) and return its public URL.
    async fn upload_screenshot(&self, png: Vec<u8>, page_url: &str) -> Result<String>;
}

/// Object key: `{prefix}{timestamp}_{slug}_{sha256}.png`.
///
/// The timestamp is ISO-8601 with `:` replaced, the slug is `page_url` with
/// every non-alphanumeric character replaced by `_`.
pub fn screenshot_key(prefix: &str, now: DateTime<Utc>, page_url: &str, png: &[u8]) -> String {
    let stamp: String = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .chars()
        .map(|c| if c == ':' || c.is_whitespace() { '_' } else { c })
        .collect();
    let slug: String = page_url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let digest = hex::encode(Sha256::digest(png));
    format!("{prefix}{stamp}_{slug}_{digest}.png")
}

pub struct HttpUploader {
    client: reqwest::Client,
    upload_base_url: String,
    public_url_prefix: String,
    key_prefix: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpUploader {
    /// `Ok(None)` when uploads are not configured.
    pub fn from_config(cfg: &StorageConfig) -> Result<Option<Self>> {
        let Some(base) = cfg.upload_base_url.as_ref() else {
            return Ok(None);
        };
        let timeout = Duration::from_millis(cfg.upload_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(format!("building upload client: {e}")))?;
        let token = std::env::var(&cfg.token_env).ok().filter(|t| !t.is_empty());
        Ok(Some(Self {
            client,
            upload_base_url: base.trim_end_matches('/').to_owned(),
            public_url_prefix: cfg.public_url_prefix.trim_end_matches('/').to_owned(),
            key_prefix: cfg.key_prefix.clone(),
            token,
            timeout,
        }))
    }
}

#[async_trait]
impl ScreenshotUploader for HttpUploader {
    async fn upload_screenshot(&self, png: Vec<u8>, page_url: &str) -> Result<String> {
        let key = screenshot_key(&self.key_prefix, Utc::now(), page_url, &png);
        let mut req = self
            .client
            .put(format!("{}/{key}", self.upload_base_url))
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(png);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::error!(error = %e, key = %key, "screenshot upload failed");
            Error::Storage(format!("failed to upload screenshot: {e}"))
        })?;
        if !resp.status().is_success() {
            let status = resp.status();
            tracing::error!(%status, key = %key, "screenshot upload rejected");
            return Err(Error::Storage(format!(
                "failed to upload screenshot: storage returned {status}"
            )));
        }

        tracing::debug!(key = %key, "screenshot uploaded");
        Ok(format!("{}/{key}", self.public_url_prefix))
    }
}
