mod args;
mod channels;
mod config_provider;
mod http;
mod server_error;

use crate::args::Args;
use crate::config_provider::{log_config, ConfigProvider, FileConfigProvider};
use crate::server_error::ServerError;
use anyhow::Result;
use broker::Broker;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const BANNER: &str = r"
███████ ████████ ████████ ███████ ████████ ██    ██ ███████ ██████
██         ██    ██    ██ ██   ██ ██    ██ ██    ██ ██      ██   ██
███████    ██    ██    ██ ███████ ██    ██ ██    ██ █████   ██████
     ██    ██    ██    ██ ██      ██    ██  ██  ██  ██      ██   ██
███████    ██    ████████ ██      ████████   ████   ███████ ██   ██
";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("{BANNER}{:>67}", format!("Stopover v{}", env!("CARGO_PKG_VERSION")));

    let config_provider = FileConfigProvider::new(args.config);
    let config = config_provider.load_config().await?;
    log_config(&config);

    // The sentinel marks the streams directory as ours; refuse to run
    // against anything else.
    if !config.streams_path().join(".active").is_file() {
        error!("the streams dir is not active");
        return Err(ServerError::StreamsDirNotActive.into());
    }

    let broker = Arc::new(Broker::new(config.clone()));
    channels::start(broker.clone(), &config);

    let address = format!("0.0.0.0:{}", config.port());
    let listener = TcpListener::bind(&address).await?;
    info!("Stopover server has started on: {address}");
    axum::serve(listener, http::create_router(broker))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Stopover server has shut down.");
    Ok(())
}

/// Resolves when SIGTERM or ctrl-c arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!("Failed to install ctrl-c handler: {error}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => error!("Failed to install SIGTERM handler: {error}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
