mod browser;
mod mcp;
mod observability;
mod server;
mod sessions;

pub use browser::*;
pub use mcp::*;
pub use observability::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Apply the environment variables deployments commonly set instead of
    /// editing the config file: `PORT`, `SESSION_LIFETIME_MS` and
    /// `ALLOWED_ORIGINS` (comma separated).
    ///
    /// `lookup` is `std::env::var(..).ok()` in production.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT").and_then(|v| v.trim().parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(ms) = lookup("SESSION_LIFETIME_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
            self.sessions.lifetime_ms = ms;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.browser.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: &str, message: &str| {
            errors.push(ConfigError {
                severity,
                field: field.into(),
                message: message.into(),
            });
        };

        if self.server.port == 0 {
            push(ConfigSeverity::Error, "server.port", "port must be greater than 0");
        }
        if self.server.host.is_empty() {
            push(ConfigSeverity::Error, "server.host", "host must not be empty");
        }
        if !self.server.endpoint.starts_with('/') {
            push(
                ConfigSeverity::Error,
                "server.endpoint",
                "endpoint must start with '/'",
            );
        }
        if self.server.max_concurrent_requests == 0 {
            push(
                ConfigSeverity::Error,
                "server.max_concurrent_requests",
                "must be greater than 0",
            );
        }
        if self.sessions.lifetime_ms == 0 {
            push(
                ConfigSeverity::Error,
                "sessions.lifetime_ms",
                "session lifetime must be greater than 0",
            );
        }
        if self.sessions.start_hook_timeout_ms == 0 {
            push(
                ConfigSeverity::Error,
                "sessions.start_hook_timeout_ms",
                "must be greater than 0",
            );
        }
        if self.sessions.end_hook_timeout_ms == 0 {
            push(
                ConfigSeverity::Error,
                "sessions.end_hook_timeout_ms",
                "must be greater than 0",
            );
        }
        if self.browser.page_load_timeout_ms == 0 {
            push(
                ConfigSeverity::Error,
                "browser.page_load_timeout_ms",
                "must be greater than 0",
            );
        }
        if self.storage.upload_timeout_ms == 0 {
            push(
                ConfigSeverity::Error,
                "storage.upload_timeout_ms",
                "must be greater than 0",
            );
        }
        if self.sessions.sweep_interval_secs == Some(0) {
            push(
                ConfigSeverity::Error,
                "sessions.sweep_interval_secs",
                "sweep interval must be greater than 0 (omit it to disable)",
            );
        }
        if self.mcp.supported_protocol_versions.is_empty() {
            push(
                ConfigSeverity::Error,
                "mcp.supported_protocol_versions",
                "at least one protocol version is required",
            );
        }
        if self.browser.webdriver_url.is_some() && self.browser.allowed_origins.is_empty() {
            push(
                ConfigSeverity::Warning,
                "browser.allowed_origins",
                "browser enabled but no origins allowed; every navigation will be refused",
            );
        }
        if self.browser.webdriver_url.is_some() && self.storage.upload_base_url.is_none() {
            push(
                ConfigSeverity::Warning,
                "storage.upload_base_url",
                "screenshot uploads disabled; screenshot requests will fail",
            );
        }
        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            push(
                ConfigSeverity::Warning,
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            );
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let issues = Config::default().validate();
        assert!(
            issues.iter().all(|i| i.severity != ConfigSeverity::Error),
            "unexpected errors: {issues:?}"
        );
    }

    #[test]
    fn zero_lifetime_is_an_error() {
        let mut cfg = Config::default();
        cfg.sessions.lifetime_ms = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "sessions.lifetime_ms" && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn zero_timeouts_are_errors() {
        let mut cfg = Config::default();
        cfg.sessions.start_hook_timeout_ms = 0;
        cfg.storage.upload_timeout_ms = 0;
        let fields: Vec<_> = cfg
            .validate()
            .into_iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .map(|i| i.field)
            .collect();
        assert_eq!(
            fields,
            vec!["sessions.start_hook_timeout_ms".to_string(), "storage.upload_timeout_ms".to_string()]
        );
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        cfg.apply_env_overrides(|key| match key {
            "PORT" => Some("4000".into()),
            "SESSION_LIFETIME_MS" => Some("1500".into()),
            "ALLOWED_ORIGINS" => Some("https://a.example, https://b.example,".into()),
            _ => None,
        });
        assert_eq!(cfg.server.port, 4000);
        assert_eq!(cfg.sessions.lifetime_ms, 1500);
        assert_eq!(
            cfg.browser.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn unparsable_env_values_are_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env_overrides(|key| (key == "PORT").then(|| "not-a-port".into()));
        assert_eq!(cfg.server.port, 3088);
    }

    #[test]
    fn full_file_parses() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [sessions]
            lifetime_ms = 60000

            [mcp]
            response_mode = "json"

            [browser]
            webdriver_url = "http://localhost:4444"
            allowed_origins = ["https://example.com"]
        "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.sessions.lifetime_ms, 60_000);
        assert_eq!(cfg.browser.allowed_origins.len(), 1);
        assert!(cfg.storage.upload_base_url.is_none());
    }
}
