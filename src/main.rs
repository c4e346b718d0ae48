use std::process::ExitCode;
use std::time::Duration;

use adsb_sink::backend::build_sink;
use adsb_sink::env::Config;
use adsb_sink::fetch::{SnapshotConfig, SnapshotFetcher};
use adsb_sink::init::init_tracing;
use adsb_sink::scheduler::Scheduler;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let active = match build_sink(&config) {
        Ok(active) => active,
        Err(e) => {
            error!(error = %e, mode = %config.mode, "failed to build sink");
            return ExitCode::FAILURE;
        }
    };

    let fetcher = match SnapshotFetcher::new(SnapshotConfig {
        url: config.source_url.clone(),
        service_name: config.service_name.clone(),
        timeout: SOURCE_TIMEOUT,
    }) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!(error = %e, "failed to build snapshot client");
            active.shutdown().await;
            return ExitCode::FAILURE;
        }
    };

    info!(
        mode = %config.mode,
        source = %config.source_url,
        interval = ?config.fetch_interval,
        "starting delivery loop"
    );

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(config.fetch_interval);
    scheduler
        .run(&fetcher, active.sink(), &cancel, shutdown_signal())
        .await;

    active.shutdown().await;
    info!("stopped");
    ExitCode::SUCCESS
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
