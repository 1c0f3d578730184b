use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session lifecycle configuration: idle expiry and start-hook behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Idle threshold in milliseconds.  A session not touched for longer
    /// than this is reclaimed by the next sweep.
    #[serde(default = "d_lifetime_ms")]
    pub lifetime_ms: u64,

    /// Interval for the background sweeper.  `None` means sessions are only
    /// swept opportunistically after request handling.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,

    /// When `true`, the handshake response is held until the session-start
    /// hook has finished.  When `false` the hook runs in the background and
    /// tool calls wait on the initialization gate instead.
    #[serde(default)]
    pub await_start_hook: bool,

    /// Upper bound on the session-start hook.  A hook still running after
    /// this fails the initialization gate with "start hook timed out".
    #[serde(default = "d_hook_timeout_ms")]
    pub start_hook_timeout_ms: u64,

    /// Upper bound on the session-end hook.  The session is removed either
    /// way; a timeout is reported like any other end-hook failure.
    #[serde(default = "d_hook_timeout_ms")]
    pub end_hook_timeout_ms: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            lifetime_ms: d_lifetime_ms(),
            sweep_interval_secs: None,
            await_start_hook: false,
            start_hook_timeout_ms: d_hook_timeout_ms(),
            end_hook_timeout_ms: d_hook_timeout_ms(),
        }
    }
}

impl SessionsConfig {
    pub fn lifetime(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lifetime_ms)
    }

    pub fn start_hook_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.start_hook_timeout_ms)
    }

    pub fn end_hook_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.end_hook_timeout_ms)
    }
}

fn d_lifetime_ms() -> u64 {
    30 * 60 * 1000
}
fn d_hook_timeout_ms() -> u64 {
    60_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lifetime_is_thirty_minutes() {
        let cfg = SessionsConfig::default();
        assert_eq!(cfg.lifetime(), std::time::Duration::from_secs(30 * 60));
        assert!(cfg.sweep_interval_secs.is_none());
        assert!(!cfg.await_start_hook);
        assert_eq!(cfg.start_hook_timeout(), std::time::Duration::from_secs(60));
        assert_eq!(cfg.end_hook_timeout_ms, 60_000);
    }

    #[test]
    fn parses_overrides() {
        let cfg: SessionsConfig = toml::from_str(
            r#"
            lifetime_ms = 5000
            sweep_interval_secs = 10
            await_start_hook = true
            start_hook_timeout_ms = 1500
        "#,
        )
        .unwrap();
        assert_eq!(cfg.lifetime_ms, 5000);
        assert_eq!(cfg.sweep_interval_secs, Some(10));
        assert!(cfg.await_start_hook);
        assert_eq!(cfg.start_hook_timeout_ms, 1500);
        assert_eq!(cfg.end_hook_timeout_ms, 60_000);
    }
}
