//! Configuration loading and CLI overrides.
//!
//! Config files may be json, yaml or toml, keyed on extension. Every
//! field has a default so an empty config (or none at all) runs a
//! working endpoint; only the secret is mandatory, and it may come
//! from the file, a CLI flag, or the `VLESS_SECRET` environment
//! variable — in that order of increasing precedence.

use std::{fs, path::Path};

use clap::Parser;
use serde::{Deserialize, Serialize};
use vless_core::defaults;
use vless_proto::Secret;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shared secret in canonical hyphenated form.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    #[serde(default = "default_close_grace_secs")]
    pub close_grace_secs: u64,
    #[serde(default = "default_relay_buffer_size")]
    pub relay_buffer_size: usize,
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default = "default_connection_backlog")]
    pub connection_backlog: u32,
    /// Maximum concurrent sessions (None = unlimited).
    #[serde(default)]
    pub max_connections: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            dial_timeout_secs: default_dial_timeout_secs(),
            close_grace_secs: default_close_grace_secs(),
            relay_buffer_size: default_relay_buffer_size(),
            max_header_bytes: default_max_header_bytes(),
            max_frame_bytes: default_max_frame_bytes(),
            connection_backlog: default_connection_backlog(),
            max_connections: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_forbidden_suffixes")]
    pub forbidden_suffixes: Vec<String>,
    #[serde(default = "default_fallback_host")]
    pub fallback_host: String,
    #[serde(default = "default_fallback_port")]
    pub fallback_port: u16,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            forbidden_suffixes: default_forbidden_suffixes(),
            fallback_host: default_fallback_host(),
            fallback_port: default_fallback_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level (trace, debug, info, warn, error).
    #[serde(default)]
    pub level: Option<String>,
    /// Output format (json, compact, pretty).
    #[serde(default)]
    pub format: Option<String>,
}

fn default_listen() -> String {
    defaults::DEFAULT_LISTEN.to_owned()
}
fn default_handshake_timeout_secs() -> u64 {
    defaults::DEFAULT_HANDSHAKE_TIMEOUT_SECS
}
fn default_dial_timeout_secs() -> u64 {
    defaults::DEFAULT_DIAL_TIMEOUT_SECS
}
fn default_close_grace_secs() -> u64 {
    defaults::DEFAULT_CLOSE_GRACE_SECS
}
fn default_relay_buffer_size() -> usize {
    defaults::DEFAULT_RELAY_BUFFER_SIZE
}
fn default_max_header_bytes() -> usize {
    defaults::DEFAULT_MAX_HEADER_BYTES
}
fn default_max_frame_bytes() -> usize {
    defaults::DEFAULT_WS_MAX_FRAME_BYTES
}
fn default_connection_backlog() -> u32 {
    defaults::DEFAULT_CONNECTION_BACKLOG
}
fn default_forbidden_suffixes() -> Vec<String> {
    defaults::DEFAULT_FORBIDDEN_SUFFIXES
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}
fn default_fallback_host() -> String {
    defaults::DEFAULT_FALLBACK_HOST.to_owned()
}
fn default_fallback_port() -> u16 {
    defaults::DEFAULT_FALLBACK_PORT
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config format")]
    UnsupportedFormat,
    #[error("secret: {0}")]
    Secret(String),
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)?;
    match path.extension().and_then(|s| s.to_str()).unwrap_or("") {
        "json" => Ok(serde_json::from_str(&data)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&data)?),
        "toml" => Ok(toml::from_str(&data)?),
        _ => Err(ConfigError::UnsupportedFormat),
    }
}

/// CLI overrides applied on top of the config file.
#[derive(Debug, Clone, Parser, Default)]
pub struct CliOverrides {
    /// Override listen address, e.g. 0.0.0.0:8080
    #[arg(long)]
    pub listen: Option<String>,
    /// Shared secret (canonical hyphenated form)
    #[arg(long, env = defaults::SECRET_ENV_VAR, hide_env_values = true)]
    pub secret: Option<String>,
    /// Override fallback relay host for forbidden destinations
    #[arg(long)]
    pub fallback_host: Option<String>,
    /// Override fallback relay port for forbidden destinations
    #[arg(long)]
    pub fallback_port: Option<u16>,
    /// Override forbidden-destination suffixes (repeatable or comma-separated)
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub forbidden_suffix: Option<Vec<String>>,
    /// Override handshake timeout (seconds)
    #[arg(long)]
    pub handshake_timeout_secs: Option<u64>,
    /// Override outbound dial timeout (seconds)
    #[arg(long)]
    pub dial_timeout_secs: Option<u64>,
    /// Override maximum concurrent sessions (0 = unlimited)
    #[arg(long)]
    pub max_connections: Option<usize>,
    /// Override log level (trace/debug/info/warn/error)
    #[arg(long)]
    pub log_level: Option<String>,
}

pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) {
    if let Some(listen) = &overrides.listen {
        config.server.listen = listen.clone();
    }
    if let Some(secret) = &overrides.secret {
        config.secret = Some(secret.clone());
    }
    if let Some(host) = &overrides.fallback_host {
        config.policy.fallback_host = host.clone();
    }
    if let Some(port) = overrides.fallback_port {
        config.policy.fallback_port = port;
    }
    if let Some(suffixes) = &overrides.forbidden_suffix {
        config.policy.forbidden_suffixes = suffixes.clone();
    }
    if let Some(secs) = overrides.handshake_timeout_secs {
        config.server.handshake_timeout_secs = secs;
    }
    if let Some(secs) = overrides.dial_timeout_secs {
        config.server.dial_timeout_secs = secs;
    }
    if let Some(n) = overrides.max_connections {
        config.server.max_connections = if n == 0 { None } else { Some(n) };
    }
    if let Some(level) = &overrides.log_level {
        config.logging.level = Some(level.clone());
    }
}

/// Parse the configured secret, falling back to `VLESS_SECRET`.
pub fn resolve_secret(config: &Config) -> Result<Secret, ConfigError> {
    let raw = match &config.secret {
        Some(s) => s.clone(),
        None => std::env::var(defaults::SECRET_ENV_VAR).map_err(|_| {
            ConfigError::Secret(format!(
                "no secret configured; set `secret` or {}",
                defaults::SECRET_ENV_VAR
            ))
        })?,
    };
    raw.parse()
        .map_err(|e: vless_proto::InvalidSecret| ConfigError::Secret(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gets_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, defaults::DEFAULT_LISTEN);
        assert_eq!(config.policy.fallback_host, "1.1.1.1");
        assert_eq!(config.policy.fallback_port, 80);
        assert_eq!(
            config.policy.forbidden_suffixes,
            vec![".workers.dev", ".pages.dev"]
        );
        assert!(config.secret.is_none());
        assert!(config.server.max_connections.is_none());
    }

    #[test]
    fn partial_toml_overrides_defaults() {
        let config: Config = toml::from_str(
            r#"
            secret = "dba99842-a33e-4bd3-a183-26e4a690be03"

            [server]
            listen = "127.0.0.1:9000"
            dial_timeout_secs = 3

            [policy]
            fallback_host = "9.9.9.9"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.dial_timeout_secs, 3);
        assert_eq!(config.server.handshake_timeout_secs, 10);
        assert_eq!(config.policy.fallback_host, "9.9.9.9");
        assert_eq!(config.policy.fallback_port, 80);
        let secret = resolve_secret(&config).unwrap();
        assert_eq!(secret.to_string(), "dba99842-a33e-4bd3-a183-26e4a690be03");
    }

    #[test]
    fn overrides_win() {
        let mut config = Config::default();
        let overrides = CliOverrides {
            listen: Some("0.0.0.0:443".to_owned()),
            fallback_port: Some(8080),
            forbidden_suffix: Some(vec![".internal".to_owned()]),
            max_connections: Some(0),
            ..Default::default()
        };
        apply_overrides(&mut config, &overrides);
        assert_eq!(config.server.listen, "0.0.0.0:443");
        assert_eq!(config.policy.fallback_port, 8080);
        assert_eq!(config.policy.forbidden_suffixes, vec![".internal"]);
        assert!(config.server.max_connections.is_none());
    }

    #[test]
    fn malformed_secret_rejected() {
        let config = Config {
            secret: Some("not-a-secret".to_owned()),
            ..Default::default()
        };
        assert!(resolve_secret(&config).is_err());
    }
}
