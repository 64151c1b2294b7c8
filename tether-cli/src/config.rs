//! Configuration for tether.
//!
//! Config file lives at `~/.config/tether/config.toml` unless `--config`
//! points somewhere else. Values are read once at startup and merged with
//! command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_sdk::backoff::Backoff;
use tether_sdk::transport::ConnectTarget;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 25565;
pub const DEFAULT_USERNAME: &str = "bot";
pub const DEFAULT_VERSION: &str = "1.21.11";
pub const DEFAULT_PREFIX: &str = ":";
pub const DEFAULT_PROMPT: &str = "> ";
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
pub const DEFAULT_MAX_RECONNECT_DELAY_MS: u64 = 60_000;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 120;
/// Upper bound for the idle timeout (one day).
pub const MAX_IDLE_TIMEOUT_SECS: u64 = 86_400;

/// User configuration (persisted in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Server host name or address.
    pub host: Option<String>,
    /// Server port. Default: 25565
    pub port: Option<u16>,
    /// Name the bot logs in as.
    pub username: Option<String>,
    /// Protocol version hint sent at login.
    pub version: Option<String>,
    /// Marks operator lines as control commands. Default: ":"
    pub prefix: Option<String>,
    /// Input prompt.
    pub prompt: Option<String>,
    /// Scheduled reconnects allowed per disconnection episode.
    pub max_reconnect_attempts: Option<u32>,
    /// Delay before the first reconnect of an episode.
    pub base_reconnect_delay_ms: Option<u64>,
    /// Backoff ceiling.
    pub max_reconnect_delay_ms: Option<u64>,
    /// Drop the session after this long without server traffic.
    pub idle_timeout_secs: Option<u64>,
    /// Connect with TLS.
    pub tls: Option<bool>,
    /// Skip TLS certificate verification.
    pub tls_insecure: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("bad config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("host must not be empty")]
    EmptyHost,
    #[error("port must not be 0")]
    ZeroPort,
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("command prefix must not be empty")]
    EmptyPrefix,
    #[error("reconnect delay must be at least 1ms")]
    ZeroDelay,
    #[error("max reconnect delay ({max_ms}ms) is below the base delay ({base_ms}ms)")]
    CeilingBelowBase { base_ms: u64, max_ms: u64 },
    #[error("idle timeout must be between 1 and {MAX_IDLE_TIMEOUT_SECS} seconds, got {0}")]
    IdleTimeout(u64),
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
}

pub fn default_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl Config {
    /// Read `path`. A missing file is only an error when the path was given
    /// explicitly; otherwise defaults apply.
    pub fn load(path: &Path, explicit: bool) -> Result<Self, ConfigError> {
        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Effective settings after merging CLI flags > config file > defaults.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub target: ConnectTarget,
    pub backoff: Backoff,
    pub prefix: String,
    pub prompt: String,
}

impl Resolved {
    pub fn merge(cli: &super::Cli, config: &Config) -> Result<Self, ConfigError> {
        let host = cli.host.clone()
            .or_else(|| config.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.or(config.port).unwrap_or(DEFAULT_PORT);
        let username = cli.username.clone()
            .or_else(|| config.username.clone())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        let version = cli.version_hint.clone()
            .or_else(|| config.version.clone())
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        let prefix = cli.prefix.clone()
            .or_else(|| config.prefix.clone())
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        let prompt = cli.prompt.clone()
            .or_else(|| config.prompt.clone())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        let max_attempts = cli.max_reconnect_attempts
            .or(config.max_reconnect_attempts)
            .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS);
        let base_ms = cli.reconnect_delay_ms
            .or(config.base_reconnect_delay_ms)
            .unwrap_or(DEFAULT_RECONNECT_DELAY_MS);
        let max_ms = cli.max_reconnect_delay_ms
            .or(config.max_reconnect_delay_ms)
            .unwrap_or(DEFAULT_MAX_RECONNECT_DELAY_MS.max(base_ms));
        let idle_secs = cli.idle_timeout_secs
            .or(config.idle_timeout_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);

        let tls = cli.tls || config.tls.unwrap_or(false);
        let tls_insecure = cli.tls_insecure || config.tls_insecure.unwrap_or(false);

        if host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if username.trim().is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        if prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if base_ms == 0 {
            return Err(ConfigError::ZeroDelay);
        }
        if max_ms < base_ms {
            return Err(ConfigError::CeilingBelowBase { base_ms, max_ms });
        }
        if idle_secs == 0 || idle_secs > MAX_IDLE_TIMEOUT_SECS {
            return Err(ConfigError::IdleTimeout(idle_secs));
        }

        Ok(Self {
            target: ConnectTarget {
                host,
                port,
                username,
                version,
                tls,
                tls_insecure,
                idle_timeout: Duration::from_secs(idle_secs),
            },
            backoff: Backoff::new(
                Duration::from_millis(base_ms),
                Duration::from_millis(max_ms),
                max_attempts,
            ),
            prefix,
            prompt,
        })
    }
}
