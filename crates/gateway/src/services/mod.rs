//! Collaborators the tools and lifecycle hooks call out to.

pub mod browser;
pub mod uploader;
pub mod url_allowlist;

pub use browser::{BrowserEngine, BrowserLauncher, BrowserSessionHooks, WebDriverLauncher, BROWSER};
pub use uploader::{HttpUploader, ScreenshotUploader};
pub use url_allowlist::UrlAllowList;
