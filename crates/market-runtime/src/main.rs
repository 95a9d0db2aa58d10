//! # GridMarket Daemon
//!
//! The marketplace core process: the gateway, heartbeat monitor, outbox
//! flusher, chain event client, and lifecycle retry queue, each on its own
//! task, sharing one shutdown signal.
//!
//! Exit codes: `0` clean shutdown, `1` configuration error, `2`
//! irrecoverable startup failure, `3` shutdown grace period exceeded.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use market_runtime::config::MarketConfig;
use market_runtime::core::{drain, MarketCore};

#[derive(Debug, Parser)]
#[command(name = "grid-marketd", about = "GridMarket core daemon")]
struct Args {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = grid_telemetry::init_logging("info") {
        eprintln!("logging init failed: {e}");
    }

    let config = match MarketConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration rejected");
            return ExitCode::from(1);
        }
    };
    if args.check_config {
        info!("Configuration OK");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = grid_telemetry::register_metrics() {
        // Double registration only happens in tests; a cold process
        // registering twice is a bug worth seeing.
        error!(error = %e, "Metrics registration failed");
    }

    let core = match MarketCore::build(config) {
        Ok(core) => core,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return ExitCode::from(2);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handles = match core.spawn_tasks(shutdown_rx).await {
        Ok(handles) => handles,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return ExitCode::from(2);
        }
    };
    info!("GridMarket core running");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Signal listener failed, shutting down"),
    }

    let _ = shutdown_tx.send(true);
    let grace = core.config.shutdown_grace_period_sec;
    if drain(handles, grace).await {
        info!("Clean shutdown");
        ExitCode::SUCCESS
    } else {
        ExitCode::from(3)
    }
}
