//! Command-line entry points: serving, and running pending migrations
//! standalone.

use clap::{Parser, Subcommand};

use aitoys_domain::config::Config;

#[derive(Debug, Parser)]
#[command(name = "aitoys-gateway", version, about)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "config.toml")]
    pub config: String,

    /// Overrides `server.host:server.port` from the config file.
    #[arg(long, global = true)]
    pub bind: Option<String>,

    /// Overrides `observability.log_level` from the config file.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Run pending database migrations and exit.
    Migrate,
    /// Print version information.
    Version,
}

/// Loads the config file at `path`, falling back to defaults if it does
/// not exist, then layers `--bind`/`--log-level` overrides on top.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = if std::path::Path::new(&cli.config).exists() {
        let raw = std::fs::read_to_string(&cli.config)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", cli.config))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", cli.config))?
    } else {
        Config::default()
    };

    if let Some(bind) = &cli.bind {
        let (host, port) = bind
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("--bind must be host:port, got {bind}"))?;
        config.server.host = host.to_string();
        config.server.port = port
            .parse()
            .map_err(|e| anyhow::anyhow!("--bind: invalid port {port}: {e}"))?;
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_used_when_config_file_is_absent() {
        let cli = Cli {
            config: "/nonexistent/path/config.toml".into(),
            bind: None,
            log_level: None,
            command: None,
        };
        let config = load_config(&cli).unwrap();
        assert_eq!(config.server.port, Config::default().server.port);
    }

    #[test]
    fn bind_override_splits_host_and_port() {
        let cli = Cli {
            config: "/nonexistent/path/config.toml".into(),
            bind: Some("0.0.0.0:9000".into()),
            log_level: None,
            command: None,
        };
        let config = load_config(&cli).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }
}
