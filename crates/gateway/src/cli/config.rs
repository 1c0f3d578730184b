use sg_domain::config::{Config, ConfigSeverity};

/// Validate the config and print the issues plus a summary of the optional
/// features it enables.  Returns `false` when any error was found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    for issue in &issues {
        println!("{issue}");
    }

    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if issues.is_empty() {
        println!("Config OK ({config_path})");
    } else {
        println!(
            "\n{errors} error(s), {} warning(s) in {config_path}",
            issues.len() - errors
        );
    }
    for line in feature_summary(config) {
        println!("  {line}");
    }

    errors == 0
}

/// One line per optional feature, as `validate` prints them.
pub fn feature_summary(config: &Config) -> Vec<String> {
    let on_off = |on: bool| if on { "enabled" } else { "disabled" };
    let sweeper = match config.sessions.sweep_interval_secs {
        Some(secs) => format!("every {secs}s"),
        None => "on requests only".into(),
    };
    vec![
        format!(
            "endpoint: {}:{}{}",
            config.server.host, config.server.port, config.server.endpoint
        ),
        format!(
            "session idle limit: {}ms, sweep {sweeper}",
            config.sessions.lifetime_ms
        ),
        format!("browser: {}", on_off(config.browser.webdriver_url.is_some())),
        format!(
            "screenshot uploads: {}",
            on_off(config.storage.upload_base_url.is_some())
        ),
        format!(
            "strict tools list in handshake: {}",
            on_off(config.mcp.handshake.require_tools_list)
        ),
    ]
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("serializing config: {e}"))?;
    print!("{output}");
    Ok(())
}
