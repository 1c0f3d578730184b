use sg_domain::config::{Config, ConfigSeverity, ResponseMode};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.endpoint, "/mcp");
}

#[test]
fn explicit_zero_host_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 3210
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 3210);
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn sessions_default_to_opportunistic_sweeping() {
    let config = Config::default();
    assert_eq!(config.sessions.lifetime_ms, 30 * 60 * 1000);
    assert!(config.sessions.sweep_interval_secs.is_none());
    assert!(!config.sessions.await_start_hook);
}

#[test]
fn browser_and_storage_are_off_by_default() {
    let config = Config::default();
    assert!(config.browser.webdriver_url.is_none());
    assert!(config.browser.allowed_origins.is_empty());
    assert!(config.storage.upload_base_url.is_none());
    assert_eq!(config.mcp.response_mode, ResponseMode::Json);
}

#[test]
fn browser_without_allow_list_warns() {
    let config: Config = toml::from_str(
        r#"
[browser]
webdriver_url = "http://localhost:4444"

[storage]
upload_base_url = "http://minio.local/shots"
"#,
    )
    .unwrap();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].field, "browser.allowed_origins");
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
}

#[test]
fn zero_sweep_interval_is_an_error() {
    let config: Config = toml::from_str(
        r#"
[sessions]
sweep_interval_secs = 0
"#,
    )
    .unwrap();
    assert!(config
        .validate()
        .iter()
        .any(|i| i.field == "sessions.sweep_interval_secs" && i.severity == ConfigSeverity::Error));
}
