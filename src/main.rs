//! linefan - A Line-Oriented TCP Load-Balancing Proxy
//!
//! This is the main entry point for the linefan binary.
//! It parses configuration, sets up logging and signal handling, and runs the
//! proxy until SIGINT or SIGTERM.

use anyhow::Result;
use clap::Parser;
use linefan::config::ProxyConfig;
use linefan::proxy::{listen_and_proxy, ProxyError};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProxyConfig::parse();

    init_logging(config.debug)?;

    info!("linefan v{} starting", linefan::VERSION);
    if config.debug {
        info!("Diagnostics available on {}", config.diagnostics_addr);
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let signal = wait_for_shutdown().await;
            info!(signal, "Shutdown signal received, draining...");
            cancel.cancel();
        }
    });

    let summary = match listen_and_proxy(config, cancel).await {
        Ok(summary) => summary,
        Err(e) => return Err(startup_failure(e)),
    };

    info!(
        connections = summary.stats.connections_accepted,
        records = summary.stats.records_delivered,
        bytes = summary.stats.bytes_written,
        "Shutdown complete"
    );
    Ok(())
}

/// Logs a fatal startup error and turns it into the process error.
fn startup_failure(e: ProxyError) -> anyhow::Error {
    error!(error = %e, "Failed to start");
    anyhow::Error::new(e).context("proxy failed to start")
}

/// `RUST_LOG` wins when set; otherwise `--debug` picks debug over info.
fn init_logging(debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

/// Wait for SIGINT or SIGTERM and return its name
async fn wait_for_shutdown() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
