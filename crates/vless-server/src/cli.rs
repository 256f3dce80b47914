//! Command-line entry: argument parsing, logging setup, signal wiring.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{apply_overrides, load_config, resolve_secret, CliOverrides, Config, LoggingConfig};
use crate::error::ServerError;
use crate::server;
use crate::state::ServerState;

#[derive(Debug, Parser)]
#[command(name = "vless-server", version, about = "VLESS-over-WebSocket proxy endpoint")]
pub struct Args {
    /// Path to the config file (json, yaml or toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: CliOverrides,
}

/// Load config, set up logging, and serve until a shutdown signal.
pub async fn run(args: Args) -> Result<(), ServerError> {
    let mut config = match &args.config {
        Some(path) => load_config(path).map_err(|e| ServerError::Config(e.to_string()))?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &args.overrides);
    init_tracing(&config.logging);

    let secret = resolve_secret(&config).map_err(|e| ServerError::Config(e.to_string()))?;
    let state = Arc::new(ServerState::from_config(&config, secret));

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    server::run(&config, state, shutdown).await
}

fn init_tracing(logging: &LoggingConfig) {
    let level = logging.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format.as_deref() {
        Some("json") => builder.json().init(),
        Some("pretty") => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = term.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = ctrl_c.await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });
}
