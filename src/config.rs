use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

/// Server-wide settings.
///
/// Values are layered: defaults, then an optional YAML file, then
/// `BADHTTPD_*` environment variables, then command-line flags.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Idle timeout in seconds, 0 means hang forever
    pub timeout: u64,
    /// Whether to read anything from clients at all
    pub read: bool,
    /// Disconnect instead of hanging
    pub disconnect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8051,
            timeout: 0,
            read: true,
            disconnect: false,
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid YAML configuration")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&yaml)
    }

    /// Applies `BADHTTPD_*` variables looked up through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("BADHTTPD_HOST") {
            self.host = host;
        }
        if let Some(port) = env_value(&lookup, "BADHTTPD_PORT", |v| v.parse::<u16>().ok()) {
            self.port = port;
        }
        if let Some(timeout) = env_value(&lookup, "BADHTTPD_TIMEOUT", |v| v.parse::<u64>().ok()) {
            self.timeout = timeout;
        }
        if let Some(read) = env_value(&lookup, "BADHTTPD_READ", parse_bool) {
            self.read = read;
        }
        if let Some(disconnect) = env_value(&lookup, "BADHTTPD_DISCONNECT", parse_bool) {
            self.disconnect = disconnect;
        }
        self
    }

    /// `host:port`, used for binding and as the fallback redirect host.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The global idle timeout, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}

fn env_value<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let value = parse(raw.trim());
    if value.is_none() {
        tracing::warn!(key, value = %raw, "Ignoring invalid environment value");
    }
    value
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(
    name = "badhttpd",
    version,
    about = "A deliberately misbehaving HTTP server for testing clients"
)]
pub struct Cli {
    /// Host to bind to
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// How long to hang, in seconds, 0 means forever
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Actually read data from the client
    #[arg(long, value_name = "BOOL", action = clap::ArgAction::Set)]
    pub read: Option<bool>,

    /// Disconnect instead of hanging
    #[arg(long)]
    pub disconnect: bool,

    /// YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Resolves the final configuration: file (or defaults), environment,
    /// then the flags given on the command line.
    pub fn into_config(self) -> anyhow::Result<Config> {
        self.into_config_with_env(|key| std::env::var(key).ok())
    }

    pub fn into_config_with_env(
        self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Config> {
        let base = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        let mut cfg = base.with_env_from(lookup);

        if let Some(host) = self.host {
            cfg.host = host;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(timeout) = self.timeout {
            cfg.timeout = timeout;
        }
        if let Some(read) = self.read {
            cfg.read = read;
        }
        if self.disconnect {
            cfg.disconnect = true;
        }

        Ok(cfg)
    }
}
