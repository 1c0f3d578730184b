pub mod config;

use clap::{Parser, Subcommand};

use sg_domain::config::Config;

/// sessiongate: a session-oriented MCP gateway.
#[derive(Debug, Parser)]
#[command(name = "sessiongate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `SG_CONFIG` (or
/// `config.toml` by default), then apply environment overrides.  Returns
/// the parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("SG_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let mut config = read_config(&config_path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok((config, config_path))
}

/// Parse `path`, or fall back to defaults when the file does not exist.
pub fn read_config(path: &str) -> anyhow::Result<Config> {
    if !std::path::Path::new(path).exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))
}
