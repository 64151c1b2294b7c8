//! tether: keep a chat-bot session alive and talk through it.
//!
//! Lines typed at the prompt are sent as chat. Lines starting with the
//! command prefix (default `:`) control the session:
//!
//!   :q   quit
//!   :r   reconnect now
//!   :k   drop the session as if kicked

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod console;
mod input;

#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Resilient chat-bot session console")]
pub struct Cli {
    /// Config file (default: ~/.config/tether/config.toml)
    #[arg(long, env = "TETHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Name to log in as
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Protocol version hint sent at login
    #[arg(long)]
    pub version_hint: Option<String>,

    /// Command prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Input prompt
    #[arg(long)]
    pub prompt: Option<String>,

    /// Scheduled reconnects per disconnection before giving up
    #[arg(long)]
    pub max_reconnect_attempts: Option<u32>,

    /// Delay before the first reconnect, in milliseconds
    #[arg(long)]
    pub reconnect_delay_ms: Option<u64>,

    /// Backoff ceiling, in milliseconds
    #[arg(long)]
    pub max_reconnect_delay_ms: Option<u64>,

    /// Drop the session after this many seconds without server traffic
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Use TLS
    #[arg(long)]
    pub tls: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub tls_insecure: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("tether: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Startup failed");
            eprintln!("tether: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let path = cli.config.clone().unwrap_or_else(config::default_path);
    let file = config::Config::load(&path, cli.config.is_some())?;
    let settings = config::Resolved::merge(&cli, &file).context("invalid configuration")?;
    app::run(settings).await
}

/// Logs go to `--log-file` when given (info and up), otherwise to stderr
/// (warnings only, so they don't fight the prompt). `RUST_LOG` overrides.
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("can't open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| "tether=info".into()),
                )
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| "tether=warn".into()),
                )
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
